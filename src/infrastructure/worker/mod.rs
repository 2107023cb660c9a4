//! Worker Layer - 编排驱动器
//!
//! - LeasedWorker: 拉取式工作者，每次调用执行一个任务
//! - TickDispatcher: 消费本地自触发，受信号量约束地派生调用
//! - Sweeper: 周期性回收过期租约并补发触发
//! - SequentialDriver: 长时间运行的顺序驱动器

mod dispatcher;
mod leased_worker;
mod sequential_driver;
mod sweeper;

pub use dispatcher::{TickDispatcher, TickDispatcherConfig};
pub use leased_worker::{
    InvocationOutcome, JobResult, LeasedWorker, LeasedWorkerConfig,
};
pub use sequential_driver::{RunOutcome, SequentialDriver, SequentialDriverConfig};
pub use sweeper::{Sweeper, SweeperConfig};

use thiserror::Error;
use uuid::Uuid;

use crate::application::ports::RepositoryError;
use crate::application::ApplicationError;

/// 驱动器错误
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Application(#[from] ApplicationError),

    #[error("Project not found: {0}")]
    ProjectNotFound(Uuid),

    #[error("Chapter not found: {0}")]
    ChapterNotFound(Uuid),

    #[error("Sequential run already in progress for project {0}")]
    AlreadyRunning(Uuid),
}
