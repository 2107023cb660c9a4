//! Progress Query Handlers

use std::sync::Arc;
use uuid::Uuid;

use crate::application::error::ApplicationError;
use crate::application::ports::{
    ChapterRecord, ChapterRepositoryPort, JobCounts, LeaseStorePort, ProjectRepositoryPort,
};
use crate::application::queries::GetProjectProgress;

// ============================================================================
// Response DTOs
// ============================================================================

/// 章节进度
#[derive(Debug, Clone)]
pub struct ChapterProgress {
    pub id: Uuid,
    pub sort_order: i64,
    pub title: String,
    pub status: String,
    pub scene_count: usize,
    pub current_scene_index: usize,
    pub word_count: u64,
}

impl From<ChapterRecord> for ChapterProgress {
    fn from(record: ChapterRecord) -> Self {
        Self {
            id: record.id,
            sort_order: record.sort_order,
            status: record.writing_status.as_str().to_string(),
            scene_count: record.scene_count(),
            current_scene_index: record.current_scene_index,
            word_count: record.word_count,
            title: record.title,
        }
    }
}

/// 项目进度
#[derive(Debug, Clone)]
pub struct ProjectProgressResponse {
    pub project_id: Uuid,
    pub title: String,
    pub status: String,
    pub failure_reason: Option<String>,
    pub total_scenes: u64,
    pub completed_scenes: u64,
    pub failed_scenes: u64,
    pub word_count: u64,
    pub target_word_count: u64,
    pub current_chapter_index: usize,
    pub jobs: JobCounts,
    pub chapters: Vec<ChapterProgress>,
    pub updated_at: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GetProjectProgress Handler
pub struct GetProjectProgressHandler {
    project_repo: Arc<dyn ProjectRepositoryPort>,
    chapter_repo: Arc<dyn ChapterRepositoryPort>,
    lease_store: Arc<dyn LeaseStorePort>,
}

impl GetProjectProgressHandler {
    pub fn new(
        project_repo: Arc<dyn ProjectRepositoryPort>,
        chapter_repo: Arc<dyn ChapterRepositoryPort>,
        lease_store: Arc<dyn LeaseStorePort>,
    ) -> Self {
        Self {
            project_repo,
            chapter_repo,
            lease_store,
        }
    }

    pub async fn handle(
        &self,
        query: GetProjectProgress,
    ) -> Result<ProjectProgressResponse, ApplicationError> {
        let project = self
            .project_repo
            .find_by_id(query.project_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Project", query.project_id))?;

        let chapters = self.chapter_repo.find_by_project(project.id).await?;
        let jobs = self.lease_store.job_counts(project.id).await?;

        Ok(ProjectProgressResponse {
            project_id: project.id,
            title: project.title,
            status: project.writing_status.as_str().to_string(),
            failure_reason: project.failure_reason,
            total_scenes: project.total_scenes,
            completed_scenes: project.completed_scenes,
            failed_scenes: project.failed_scenes,
            word_count: project.word_count,
            target_word_count: project.target_word_count,
            current_chapter_index: project.current_chapter_index,
            jobs,
            chapters: chapters.into_iter().map(ChapterProgress::from).collect(),
            updated_at: project.updated_at.to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outline::SceneDescriptor;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn test_progress_reports_chapters_and_jobs() {
        let h = Harness::new().await;
        let (project, chapters) = h.seed_project(5_000, 2).await;

        let scenes = vec![
            SceneDescriptor::new(1, "Dock", 400),
            SceneDescriptor::new(2, "Market", 400),
        ];
        h.chapter_repo
            .store_scene_outline(chapters[0].id, &scenes)
            .await
            .unwrap();

        let handler = GetProjectProgressHandler::new(
            h.project_repo.clone(),
            h.chapter_repo.clone(),
            h.lease_store.clone(),
        );
        let progress = handler
            .handle(GetProjectProgress {
                project_id: project.id,
            })
            .await
            .unwrap();

        assert_eq!(progress.status, "idle");
        assert_eq!(progress.total_scenes, 2);
        assert_eq!(progress.chapters.len(), 2);
        assert_eq!(progress.chapters[0].scene_count, 2);
        assert_eq!(progress.chapters[1].scene_count, 0);
        assert_eq!(progress.jobs, JobCounts::default());
    }

    #[tokio::test]
    async fn test_progress_unknown_project() {
        let h = Harness::new().await;
        let handler = GetProjectProgressHandler::new(
            h.project_repo.clone(),
            h.chapter_repo.clone(),
            h.lease_store.clone(),
        );
        let err = handler
            .handle(GetProjectProgress {
                project_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound { .. }));
    }
}
