//! Application State
//!
//! 命令/查询处理器与驱动器句柄

use std::sync::Arc;

use crate::application::{
    // Command handlers
    CancelGenerationHandler, PauseGenerationHandler, ResumeGenerationHandler,
    StartGenerationHandler,
    // Query handlers
    GetProjectProgressHandler,
    // Services
    LeasedLauncher,
    // Ports
    ChapterRepositoryPort, LeaseStorePort, ProjectRepositoryPort,
};
use crate::infrastructure::worker::{LeasedWorker, SequentialDriver};

/// 应用状态
///
/// `sequential` 为 Some 时处于顺序模式：start/resume 只做状态迁移，随后在后台运行顺序驱动器。
/// 否则 start/resume 规划任务并发出自触发
pub struct AppState {
    // ========== Drivers ==========
    pub worker: Arc<LeasedWorker>,
    pub sequential: Option<Arc<SequentialDriver>>,

    // ========== Command Handlers ==========
    pub start_handler: StartGenerationHandler,
    pub pause_handler: PauseGenerationHandler,
    pub resume_handler: ResumeGenerationHandler,
    pub cancel_handler: CancelGenerationHandler,

    // ========== Query Handlers ==========
    pub progress_handler: GetProjectProgressHandler,
}

impl AppState {
    /// 创建应用状态
    pub fn new(
        project_repo: Arc<dyn ProjectRepositoryPort>,
        chapter_repo: Arc<dyn ChapterRepositoryPort>,
        lease_store: Arc<dyn LeaseStorePort>,
        launcher: Option<Arc<LeasedLauncher>>,
        worker: Arc<LeasedWorker>,
        sequential: Option<Arc<SequentialDriver>>,
    ) -> Self {
        Self {
            worker,
            sequential,

            // Command handlers
            start_handler: StartGenerationHandler::new(
                project_repo.clone(),
                chapter_repo.clone(),
                launcher.clone(),
            ),
            pause_handler: PauseGenerationHandler::new(project_repo.clone(), lease_store.clone()),
            resume_handler: ResumeGenerationHandler::new(
                project_repo.clone(),
                chapter_repo.clone(),
                lease_store.clone(),
                launcher,
            ),
            cancel_handler: CancelGenerationHandler::new(project_repo.clone(), lease_store.clone()),

            // Query handlers
            progress_handler: GetProjectProgressHandler::new(
                project_repo,
                chapter_repo,
                lease_store,
            ),
        }
    }

    /// 当前驱动器名称
    pub fn driver_name(&self) -> &'static str {
        if self.sequential.is_some() {
            "sequential"
        } else {
            "leased"
        }
    }
}
