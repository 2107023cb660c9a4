//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod accumulator;
mod clock;
mod generator;
mod lease_store;
mod notifier;
mod repositories;
mod trigger;

pub use accumulator::ContentAccumulatorPort;
pub use clock::{Clock, SystemClock};
pub use generator::{GeneratorError, GeneratorPort, OutlineRequest, SceneDraft, SceneRequest};
pub use lease_store::{
    FailOutcome, JobCounts, JobRecord, JobStatus, JobType, LeaseFilter, LeaseStorePort,
};
pub use notifier::{NotifierPort, NotifyError, ProjectCompletedNotice};
pub use repositories::{
    ChapterRecord, ChapterRepositoryPort, ChapterStatus, ProjectRecord, ProjectRepositoryPort,
    ProjectStatus, RepositoryError,
};
pub use trigger::{SelfTriggerPort, TriggerError, TriggerRequest};
