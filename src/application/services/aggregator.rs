//! Progress Aggregator - 进度汇总与项目完成判定
//!
//! 每个任务结束后调用：重新汇总字数、统计活跃任务和缺少大纲的章节，
//! 工作耗尽时以 CAS 把项目迁移到 completed / incomplete。
//! 只有赢得 completed 迁移的调用方发送完成通知

use std::sync::Arc;
use uuid::Uuid;

use crate::application::error::ApplicationError;
use crate::application::ports::{
    ChapterRepositoryPort, LeaseStorePort, NotifierPort, ProjectCompletedNotice,
    ProjectRepositoryPort, ProjectStatus,
};
use crate::domain::scheduling::{CompletionVerdict, ProgressSnapshot};

/// 汇总结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOutcome {
    pub status: ProjectStatus,
    pub snapshot: ProgressSnapshot,
    pub verdict: CompletionVerdict,
    /// 本次调用完成的项目状态迁移
    pub transitioned_to: Option<ProjectStatus>,
}

impl AggregateOutcome {
    /// 项目是否还需要工作者继续推进
    pub fn has_remaining_work(&self) -> bool {
        self.status.is_active() && self.verdict == CompletionVerdict::InProgress
    }
}

/// Progress Aggregator
pub struct ProgressAggregator {
    project_repo: Arc<dyn ProjectRepositoryPort>,
    chapter_repo: Arc<dyn ChapterRepositoryPort>,
    lease_store: Arc<dyn LeaseStorePort>,
    notifier: Arc<dyn NotifierPort>,
}

impl ProgressAggregator {
    pub fn new(
        project_repo: Arc<dyn ProjectRepositoryPort>,
        chapter_repo: Arc<dyn ChapterRepositoryPort>,
        lease_store: Arc<dyn LeaseStorePort>,
        notifier: Arc<dyn NotifierPort>,
    ) -> Self {
        Self {
            project_repo,
            chapter_repo,
            lease_store,
            notifier,
        }
    }

    pub async fn settle(&self, project_id: Uuid) -> Result<AggregateOutcome, ApplicationError> {
        let word_count = self.chapter_repo.sum_word_count(project_id).await?;
        self.project_repo
            .update_word_count(project_id, word_count)
            .await?;

        let project = self
            .project_repo
            .find_by_id(project_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Project", project_id))?;

        let counts = self.lease_store.job_counts(project_id).await?;
        let chapters_without_outline = self.chapter_repo.count_without_outline(project_id).await?;

        let snapshot = ProgressSnapshot {
            total_scenes: project.total_scenes,
            completed_scenes: project.completed_scenes,
            failed_scenes: project.failed_scenes,
            active_jobs: counts.active(),
            chapters_without_outline,
            word_count,
            target_word_count: project.target_word_count,
        };
        let verdict = snapshot.verdict();

        let mut outcome = AggregateOutcome {
            status: project.writing_status,
            snapshot,
            verdict,
            transitioned_to: None,
        };

        // 失败（含取消）的项目：清理之后才变回 pending 的残留任务
        if project.writing_status == ProjectStatus::Failed {
            if counts.pending + counts.paused > 0 {
                let reason = project.failure_reason.as_deref().unwrap_or("project failed");
                self.lease_store.cancel_project(project_id, reason).await?;
            }
            return Ok(outcome);
        }

        if !project.writing_status.is_active() {
            return Ok(outcome);
        }

        let target = match verdict {
            CompletionVerdict::InProgress => return Ok(outcome),
            CompletionVerdict::Completed => ProjectStatus::Completed,
            CompletionVerdict::Incomplete => ProjectStatus::Incomplete,
        };

        let won = self
            .project_repo
            .transition_status(project_id, &ProjectStatus::ACTIVE, target, None)
            .await?;
        if !won {
            return Ok(outcome);
        }

        outcome.status = target;
        outcome.transitioned_to = Some(target);

        tracing::info!(
            project_id = %project_id,
            status = target.as_str(),
            word_count = word_count,
            target_word_count = project.target_word_count,
            completed_scenes = project.completed_scenes,
            failed_scenes = project.failed_scenes,
            "Project settled"
        );

        if target == ProjectStatus::Completed {
            let notice = ProjectCompletedNotice {
                project_id,
                title: project.title.clone(),
                word_count,
                completed_scenes: project.completed_scenes,
                failed_scenes: project.failed_scenes,
            };
            if let Err(e) = self.notifier.notify_completed(&notice).await {
                tracing::warn!(
                    project_id = %project_id,
                    error = %e,
                    "Completion notification failed"
                );
            }
        }

        Ok(outcome)
    }
}
