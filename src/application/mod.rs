//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（Repository、LeaseStore、Generator、Notifier、SelfTrigger 等）
//! - commands: CQRS 命令及处理器（开始 / 暂停 / 恢复 / 取消）
//! - queries: CQRS 查询及处理器（项目进度）
//! - services: 两个驱动器共用的规划与汇总
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod ports;
pub mod queries;
pub mod services;

// Re-exports
pub use commands::{
    handlers::{
        CancelGenerationHandler, GenerationControlResponse, PauseGenerationHandler,
        ResumeGenerationHandler, StartGenerationHandler, CANCELLED_REASON,
    },
    CancelGeneration, PauseGeneration, ResumeGeneration, StartGeneration,
};

pub use error::ApplicationError;

pub use ports::{
    // Repositories
    ChapterRecord,
    ChapterRepositoryPort,
    ChapterStatus,
    ProjectRecord,
    ProjectRepositoryPort,
    ProjectStatus,
    RepositoryError,
    // Lease store
    FailOutcome,
    JobCounts,
    JobRecord,
    JobStatus,
    JobType,
    LeaseFilter,
    LeaseStorePort,
    // Generator
    GeneratorError,
    GeneratorPort,
    // Side effects
    Clock,
    ContentAccumulatorPort,
    NotifierPort,
    SelfTriggerPort,
    SystemClock,
    TriggerRequest,
};

pub use queries::{
    handlers::{ChapterProgress, GetProjectProgressHandler, ProjectProgressResponse},
    GetProjectProgress,
};

pub use services::{AggregateOutcome, JobPlanner, LeasedLauncher, ProgressAggregator};
