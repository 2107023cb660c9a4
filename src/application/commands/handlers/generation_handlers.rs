//! Generation Command Handlers
//!
//! 外部只能把项目置为 开始 / 暂停 / 恢复 / 取消，
//! 活跃状态下其余字段归编排器独占。所有状态迁移都是 CAS

use std::sync::Arc;
use uuid::Uuid;

use crate::application::commands::{
    CancelGeneration, PauseGeneration, ResumeGeneration, StartGeneration,
};
use crate::application::error::ApplicationError;
use crate::application::ports::{
    ChapterRepositoryPort, LeaseStorePort, ProjectRecord, ProjectRepositoryPort, ProjectStatus,
};
use crate::application::services::LeasedLauncher;

/// 取消时写入的失败原因
pub const CANCELLED_REASON: &str = "cancelled";

/// 生成控制响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationControlResponse {
    pub project_id: Uuid,
    pub status: ProjectStatus,
    /// 本次操作影响的任务数（新建 / 暂停 / 恢复 / 取消）
    pub jobs_affected: usize,
}

async fn load_project(
    project_repo: &dyn ProjectRepositoryPort,
    project_id: Uuid,
) -> Result<ProjectRecord, ApplicationError> {
    project_repo
        .find_by_id(project_id)
        .await?
        .ok_or_else(|| ApplicationError::not_found("Project", project_id))
}

/// 进入活跃状态时的目标：还有章节缺大纲则先生成大纲
async fn active_status_for(
    chapter_repo: &dyn ChapterRepositoryPort,
    project_id: Uuid,
) -> Result<ProjectStatus, ApplicationError> {
    let without_outline = chapter_repo.count_without_outline(project_id).await?;
    Ok(if without_outline > 0 {
        ProjectStatus::GeneratingOutlines
    } else {
        ProjectStatus::Writing
    })
}

// ============================================================================
// StartGeneration
// ============================================================================

/// StartGeneration Handler
///
/// idle → generating_outlines / writing。已在活跃状态时重复调用只会重新规划并触发，
/// 拉取式模式下 `launcher` 为 Some，顺序模式由调用方另行启动驱动器
pub struct StartGenerationHandler {
    project_repo: Arc<dyn ProjectRepositoryPort>,
    chapter_repo: Arc<dyn ChapterRepositoryPort>,
    launcher: Option<Arc<LeasedLauncher>>,
}

impl StartGenerationHandler {
    pub fn new(
        project_repo: Arc<dyn ProjectRepositoryPort>,
        chapter_repo: Arc<dyn ChapterRepositoryPort>,
        launcher: Option<Arc<LeasedLauncher>>,
    ) -> Self {
        Self {
            project_repo,
            chapter_repo,
            launcher,
        }
    }

    pub async fn handle(
        &self,
        command: StartGeneration,
    ) -> Result<GenerationControlResponse, ApplicationError> {
        let project_id = command.project_id;
        let project = load_project(self.project_repo.as_ref(), project_id).await?;

        let status = match project.writing_status {
            ProjectStatus::Idle => {
                let to = active_status_for(self.chapter_repo.as_ref(), project_id).await?;
                let won = self
                    .project_repo
                    .transition_status(project_id, &[ProjectStatus::Idle], to, None)
                    .await?;
                if !won {
                    let current = load_project(self.project_repo.as_ref(), project_id).await?;
                    if !current.writing_status.is_active() {
                        return Err(ApplicationError::wrong_status(
                            "start",
                            current.writing_status,
                        ));
                    }
                    current.writing_status
                } else {
                    to
                }
            }
            status if status.is_active() => status,
            status => return Err(ApplicationError::wrong_status("start", status)),
        };

        let jobs_affected = match &self.launcher {
            Some(launcher) => launcher.launch(project_id).await?,
            None => 0,
        };

        tracing::info!(
            project_id = %project_id,
            status = status.as_str(),
            jobs_created = jobs_affected,
            "Generation started"
        );

        Ok(GenerationControlResponse {
            project_id,
            status,
            jobs_affected,
        })
    }
}

// ============================================================================
// PauseGeneration
// ============================================================================

/// PauseGeneration Handler
///
/// 活跃 → paused，排队中的任务同时置为 paused。
/// 正在执行的任务不会被打断，结束后由工作者正常结算
pub struct PauseGenerationHandler {
    project_repo: Arc<dyn ProjectRepositoryPort>,
    lease_store: Arc<dyn LeaseStorePort>,
}

impl PauseGenerationHandler {
    pub fn new(
        project_repo: Arc<dyn ProjectRepositoryPort>,
        lease_store: Arc<dyn LeaseStorePort>,
    ) -> Self {
        Self {
            project_repo,
            lease_store,
        }
    }

    pub async fn handle(
        &self,
        command: PauseGeneration,
    ) -> Result<GenerationControlResponse, ApplicationError> {
        let project_id = command.project_id;
        let project = load_project(self.project_repo.as_ref(), project_id).await?;

        let won = self
            .project_repo
            .transition_status(
                project_id,
                &ProjectStatus::ACTIVE,
                ProjectStatus::Paused,
                None,
            )
            .await?;
        if !won {
            let current = load_project(self.project_repo.as_ref(), project_id).await?;
            if current.writing_status != ProjectStatus::Paused {
                return Err(ApplicationError::wrong_status(
                    "pause",
                    current.writing_status,
                ));
            }
        }

        let paused = self.lease_store.pause_project(project_id).await?;

        tracing::info!(
            project_id = %project_id,
            from = project.writing_status.as_str(),
            jobs_paused = paused,
            "Generation paused"
        );

        Ok(GenerationControlResponse {
            project_id,
            status: ProjectStatus::Paused,
            jobs_affected: paused as usize,
        })
    }
}

// ============================================================================
// ResumeGeneration
// ============================================================================

/// ResumeGeneration Handler
///
/// paused → generating_outlines / writing，paused 任务回到 pending。
/// 拉取式模式下补齐缺失任务（顺序驱动器推进过的位置不会重复规划）
pub struct ResumeGenerationHandler {
    project_repo: Arc<dyn ProjectRepositoryPort>,
    chapter_repo: Arc<dyn ChapterRepositoryPort>,
    lease_store: Arc<dyn LeaseStorePort>,
    launcher: Option<Arc<LeasedLauncher>>,
}

impl ResumeGenerationHandler {
    pub fn new(
        project_repo: Arc<dyn ProjectRepositoryPort>,
        chapter_repo: Arc<dyn ChapterRepositoryPort>,
        lease_store: Arc<dyn LeaseStorePort>,
        launcher: Option<Arc<LeasedLauncher>>,
    ) -> Self {
        Self {
            project_repo,
            chapter_repo,
            lease_store,
            launcher,
        }
    }

    pub async fn handle(
        &self,
        command: ResumeGeneration,
    ) -> Result<GenerationControlResponse, ApplicationError> {
        let project_id = command.project_id;
        let project = load_project(self.project_repo.as_ref(), project_id).await?;

        let status = match project.writing_status {
            ProjectStatus::Paused => {
                let to = active_status_for(self.chapter_repo.as_ref(), project_id).await?;
                let won = self
                    .project_repo
                    .transition_status(project_id, &[ProjectStatus::Paused], to, None)
                    .await?;
                if !won {
                    let current = load_project(self.project_repo.as_ref(), project_id).await?;
                    if !current.writing_status.is_active() {
                        return Err(ApplicationError::wrong_status(
                            "resume",
                            current.writing_status,
                        ));
                    }
                    current.writing_status
                } else {
                    to
                }
            }
            status if status.is_active() => status,
            status => return Err(ApplicationError::wrong_status("resume", status)),
        };

        let resumed = self.lease_store.resume_project(project_id).await? as usize;
        let created = match &self.launcher {
            Some(launcher) => launcher.launch(project_id).await?,
            None => 0,
        };

        tracing::info!(
            project_id = %project_id,
            status = status.as_str(),
            jobs_resumed = resumed,
            jobs_created = created,
            "Generation resumed"
        );

        Ok(GenerationControlResponse {
            project_id,
            status,
            jobs_affected: resumed + created,
        })
    }
}

// ============================================================================
// CancelGeneration
// ============================================================================

/// CancelGeneration Handler
///
/// 活跃 / paused → failed（原因 "cancelled"），排队任务全部终止
pub struct CancelGenerationHandler {
    project_repo: Arc<dyn ProjectRepositoryPort>,
    lease_store: Arc<dyn LeaseStorePort>,
}

impl CancelGenerationHandler {
    pub fn new(
        project_repo: Arc<dyn ProjectRepositoryPort>,
        lease_store: Arc<dyn LeaseStorePort>,
    ) -> Self {
        Self {
            project_repo,
            lease_store,
        }
    }

    pub async fn handle(
        &self,
        command: CancelGeneration,
    ) -> Result<GenerationControlResponse, ApplicationError> {
        let project_id = command.project_id;
        load_project(self.project_repo.as_ref(), project_id).await?;

        let cancellable = [
            ProjectStatus::GeneratingOutlines,
            ProjectStatus::Writing,
            ProjectStatus::Paused,
        ];
        let won = self
            .project_repo
            .transition_status(
                project_id,
                &cancellable,
                ProjectStatus::Failed,
                Some(CANCELLED_REASON),
            )
            .await?;
        if !won {
            let current = load_project(self.project_repo.as_ref(), project_id).await?;
            if current.writing_status != ProjectStatus::Failed {
                return Err(ApplicationError::wrong_status(
                    "cancel",
                    current.writing_status,
                ));
            }
        }

        let cancelled = self
            .lease_store
            .cancel_project(project_id, CANCELLED_REASON)
            .await?;

        tracing::info!(
            project_id = %project_id,
            jobs_cancelled = cancelled,
            "Generation cancelled"
        );

        Ok(GenerationControlResponse {
            project_id,
            status: ProjectStatus::Failed,
            jobs_affected: cancelled as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{JobStatus, JobType, LeaseFilter, TriggerRequest};
    use crate::test_support::Harness;

    #[tokio::test]
    async fn test_start_leased_plans_outline_jobs_and_fires_trigger() {
        let h = Harness::new().await;
        let (project, chapters) = h.seed_project(10_000, 3).await;

        let handler = h.start_handler(true);
        let response = handler
            .handle(StartGeneration {
                project_id: project.id,
            })
            .await
            .unwrap();

        assert_eq!(response.status, ProjectStatus::GeneratingOutlines);
        assert_eq!(response.jobs_affected, 3);

        let jobs = h.lease_store.find_by_project(project.id).await.unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.job_type == JobType::GenerateOutline));
        assert_eq!(jobs[0].chapter_id, chapters[0].id);

        assert_eq!(
            h.trigger.requests(),
            vec![TriggerRequest::now(Some(project.id))]
        );
    }

    #[tokio::test]
    async fn test_start_twice_does_not_duplicate_jobs() {
        let h = Harness::new().await;
        let (project, _) = h.seed_project(10_000, 2).await;
        let handler = h.start_handler(true);

        let command = StartGeneration {
            project_id: project.id,
        };
        handler.handle(command.clone()).await.unwrap();
        let again = handler.handle(command).await.unwrap();

        assert_eq!(again.jobs_affected, 0);
        assert_eq!(h.lease_store.find_by_project(project.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_start_sequential_only_transitions() {
        let h = Harness::new().await;
        let (project, _) = h.seed_project(10_000, 2).await;

        let response = h
            .start_handler(false)
            .handle(StartGeneration {
                project_id: project.id,
            })
            .await
            .unwrap();

        assert_eq!(response.status, ProjectStatus::GeneratingOutlines);
        assert!(h.lease_store.find_by_project(project.id).await.unwrap().is_empty());
        assert!(h.trigger.requests().is_empty());
    }

    #[tokio::test]
    async fn test_start_rejects_terminal_project() {
        let h = Harness::new().await;
        let (project, _) = h.seed_project(10_000, 1).await;
        h.project_repo
            .transition_status(project.id, &[ProjectStatus::Idle], ProjectStatus::Completed, None)
            .await
            .unwrap();

        let err = h
            .start_handler(true)
            .handle(StartGeneration {
                project_id: project.id,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::WrongStatus { .. }));
    }

    #[tokio::test]
    async fn test_start_unknown_project_is_not_found() {
        let h = Harness::new().await;
        let err = h
            .start_handler(true)
            .handle(StartGeneration {
                project_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_pause_blocks_leasing_until_resume() {
        let h = Harness::new().await;
        let (project, _) = h.seed_project(10_000, 2).await;
        h.start_handler(true)
            .handle(StartGeneration {
                project_id: project.id,
            })
            .await
            .unwrap();

        let paused = PauseGenerationHandler::new(h.project_repo.clone(), h.lease_store.clone())
            .handle(PauseGeneration {
                project_id: project.id,
            })
            .await
            .unwrap();
        assert_eq!(paused.status, ProjectStatus::Paused);
        assert_eq!(paused.jobs_affected, 2);

        let leased = h
            .lease_store
            .lease_next(&LeaseFilter::any(), "worker-a")
            .await
            .unwrap();
        assert!(leased.is_none());

        let resumed = h
            .resume_handler(true)
            .handle(ResumeGeneration {
                project_id: project.id,
            })
            .await
            .unwrap();
        assert_eq!(resumed.status, ProjectStatus::GeneratingOutlines);
        assert_eq!(resumed.jobs_affected, 2);

        let leased = h
            .lease_store
            .lease_next(&LeaseFilter::any(), "worker-a")
            .await
            .unwrap();
        assert!(leased.is_some());
    }

    #[tokio::test]
    async fn test_pause_is_idempotent_and_rejects_idle() {
        let h = Harness::new().await;
        let (project, _) = h.seed_project(10_000, 1).await;
        let handler = PauseGenerationHandler::new(h.project_repo.clone(), h.lease_store.clone());

        let err = handler
            .handle(PauseGeneration {
                project_id: project.id,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::WrongStatus { .. }));

        h.start_handler(true)
            .handle(StartGeneration {
                project_id: project.id,
            })
            .await
            .unwrap();
        handler
            .handle(PauseGeneration {
                project_id: project.id,
            })
            .await
            .unwrap();
        let again = handler
            .handle(PauseGeneration {
                project_id: project.id,
            })
            .await
            .unwrap();
        assert_eq!(again.status, ProjectStatus::Paused);
        assert_eq!(again.jobs_affected, 0);
    }

    #[tokio::test]
    async fn test_cancel_fails_project_and_queued_jobs() {
        let h = Harness::new().await;
        let (project, _) = h.seed_project(10_000, 2).await;
        h.start_handler(true)
            .handle(StartGeneration {
                project_id: project.id,
            })
            .await
            .unwrap();

        let response = CancelGenerationHandler::new(h.project_repo.clone(), h.lease_store.clone())
            .handle(CancelGeneration {
                project_id: project.id,
            })
            .await
            .unwrap();
        assert_eq!(response.status, ProjectStatus::Failed);
        assert_eq!(response.jobs_affected, 2);

        let stored = h.project_repo.find_by_id(project.id).await.unwrap().unwrap();
        assert_eq!(stored.writing_status, ProjectStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some(CANCELLED_REASON));

        let jobs = h.lease_store.find_by_project(project.id).await.unwrap();
        assert!(jobs.iter().all(|j| j.status == JobStatus::Failed));
        assert!(jobs
            .iter()
            .all(|j| j.last_error.as_deref() == Some(CANCELLED_REASON)));
    }
}
