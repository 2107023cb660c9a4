//! Job Planner - 幂等任务规划
//!
//! 根据持久化的章节/场景位置补齐缺失的任务。
//! 入队在 (chapter, job_type, scene_index) 上幂等，重复规划不会产生重复工作

use std::sync::Arc;
use uuid::Uuid;

use crate::application::error::ApplicationError;
use crate::application::ports::{
    ChapterRecord, ChapterRepositoryPort, ChapterStatus, Clock, JobRecord, LeaseStorePort,
};
use crate::domain::outline::SceneDescriptor;

/// Job Planner
pub struct JobPlanner {
    chapter_repo: Arc<dyn ChapterRepositoryPort>,
    lease_store: Arc<dyn LeaseStorePort>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl JobPlanner {
    pub fn new(
        chapter_repo: Arc<dyn ChapterRepositoryPort>,
        lease_store: Arc<dyn LeaseStorePort>,
        clock: Arc<dyn Clock>,
        max_attempts: u32,
    ) -> Self {
        Self {
            chapter_repo,
            lease_store,
            clock,
            max_attempts,
        }
    }

    /// 为项目补齐任务，返回新建数量
    ///
    /// 没有大纲的章节得到一个大纲任务；有大纲的章节为每个尚未结算的场景
    /// 各建一个写作任务
    pub async fn plan(&self, project_id: Uuid) -> Result<usize, ApplicationError> {
        let chapters = self.chapter_repo.find_by_project(project_id).await?;
        let now = self.clock.now();

        let mut jobs = Vec::new();
        for chapter in &chapters {
            if matches!(
                chapter.writing_status,
                ChapterStatus::Completed | ChapterStatus::Failed
            ) {
                continue;
            }
            match &chapter.scene_outline {
                None => jobs.push(JobRecord::outline(
                    project_id,
                    chapter.id,
                    chapter.sort_order,
                    self.max_attempts,
                    now,
                )),
                Some(scenes) => jobs.extend(self.scene_jobs(chapter, scenes).await?),
            }
        }

        let created = self.lease_store.enqueue(&jobs).await?;

        tracing::info!(
            project_id = %project_id,
            chapters = chapters.len(),
            planned = jobs.len(),
            created = created,
            "Generation jobs planned"
        );

        Ok(created)
    }

    /// 大纲落盘后为章节展开场景任务，返回新建数量
    pub async fn fan_out(
        &self,
        chapter: &ChapterRecord,
        scenes: &[SceneDescriptor],
    ) -> Result<usize, ApplicationError> {
        let jobs = self.scene_jobs(chapter, scenes).await?;
        let created = self.lease_store.enqueue(&jobs).await?;

        tracing::debug!(
            chapter_id = %chapter.id,
            scenes = scenes.len(),
            created = created,
            "Scene jobs fanned out"
        );

        Ok(created)
    }

    async fn scene_jobs(
        &self,
        chapter: &ChapterRecord,
        scenes: &[SceneDescriptor],
    ) -> Result<Vec<JobRecord>, ApplicationError> {
        let settled = self.chapter_repo.settled_scenes(chapter.id).await?;
        let now = self.clock.now();
        Ok(scenes
            .iter()
            .enumerate()
            .filter(|(index, _)| !settled.contains(index))
            .map(|(index, scene)| {
                JobRecord::scene(
                    chapter.project_id,
                    chapter.id,
                    chapter.sort_order,
                    index,
                    scene.clone(),
                    self.max_attempts,
                    now,
                )
            })
            .collect())
    }
}
