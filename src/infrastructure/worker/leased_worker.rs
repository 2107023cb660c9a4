//! Leased Worker - 拉取式无状态工作者
//!
//! 每次调用只领取并执行一个任务：
//! - 大纲任务：生成（或复用已落盘的）场景大纲，展开为场景任务
//! - 场景任务：生成正文并原子追加到章节
//!
//! 执行完成后汇总项目进度，仍有工作时发出一次与本次调用解耦的自触发。
//! 工作者自身从不 sleep，退避中的任务通过带延迟的自触发继续

use std::sync::Arc;
use uuid::Uuid;

use super::WorkerError;
use crate::application::ports::{
    ChapterRecord, ChapterRepositoryPort, ChapterStatus, Clock, ContentAccumulatorPort,
    FailOutcome, GeneratorError, GeneratorPort, JobRecord, JobType, LeaseFilter, LeaseStorePort,
    ProjectRecord, ProjectRepositoryPort, ProjectStatus, SelfTriggerPort, TriggerRequest,
};
use crate::application::services::{outline_request, scene_request, JobPlanner, ProgressAggregator};
use crate::domain::scene_fragment;
use crate::domain::scheduling::{RetryDecision, RetryPolicy};

/// 单个任务的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    /// 大纲已落盘并展开
    OutlineStored { scenes: usize, jobs_created: usize },
    /// 场景正文已追加
    SceneWritten { word_count: u64 },
    /// 场景此前已写入（上一个租约持有者崩溃或超时），只结算任务
    AlreadyWritten,
    /// 失败后已重新排期
    Rescheduled { attempts: u32 },
    /// 预算耗尽，任务终止
    Exhausted { attempts: u32 },
    /// 执行期间租约被回收，结果交给新的持有者
    LeaseLost,
}

/// 一次调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// 没有待处理任务
    Idle,
    /// 剩余任务都在退避中，最早可在 `retry_in` 后领取
    Deferred { retry_in: std::time::Duration },
    /// 执行了一个任务
    Executed {
        job_id: Uuid,
        project_id: Uuid,
        job_type: JobType,
        result: JobResult,
    },
}

/// Worker 配置
#[derive(Debug, Clone)]
pub struct LeasedWorkerConfig {
    /// 租约持有者前缀，每次调用追加一个随机后缀
    pub worker_id: String,
}

impl Default for LeasedWorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker".to_string(),
        }
    }
}

/// 拉取式工作者
pub struct LeasedWorker {
    config: LeasedWorkerConfig,
    project_repo: Arc<dyn ProjectRepositoryPort>,
    chapter_repo: Arc<dyn ChapterRepositoryPort>,
    accumulator: Arc<dyn ContentAccumulatorPort>,
    lease_store: Arc<dyn LeaseStorePort>,
    generator: Arc<dyn GeneratorPort>,
    planner: Arc<JobPlanner>,
    aggregator: Arc<ProgressAggregator>,
    trigger: Arc<dyn SelfTriggerPort>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl LeasedWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: LeasedWorkerConfig,
        project_repo: Arc<dyn ProjectRepositoryPort>,
        chapter_repo: Arc<dyn ChapterRepositoryPort>,
        accumulator: Arc<dyn ContentAccumulatorPort>,
        lease_store: Arc<dyn LeaseStorePort>,
        generator: Arc<dyn GeneratorPort>,
        planner: Arc<JobPlanner>,
        aggregator: Arc<ProgressAggregator>,
        trigger: Arc<dyn SelfTriggerPort>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            project_repo,
            chapter_repo,
            accumulator,
            lease_store,
            generator,
            planner,
            aggregator,
            trigger,
            policy,
            clock,
        }
    }

    /// 执行一次调用：领取至多一个任务
    pub async fn run_once(&self, filter: LeaseFilter) -> Result<InvocationOutcome, WorkerError> {
        let owner = format!("{}-{}", self.config.worker_id, Uuid::new_v4().simple());

        let Some(job) = self.lease_store.lease_next(&filter, &owner).await? else {
            return self.idle_outcome(filter.project_id).await;
        };

        tracing::debug!(
            job_id = %job.id,
            project_id = %job.project_id,
            job_type = job.job_type.as_str(),
            attempts = job.attempts,
            owner = %owner,
            "Job leased"
        );

        let result = match job.job_type {
            JobType::GenerateOutline => self.run_outline_job(&job, &owner).await?,
            JobType::WriteScene => self.run_scene_job(&job, &owner).await?,
        };

        let outcome = self.aggregator.settle(job.project_id).await?;
        if outcome.has_remaining_work() {
            self.fire_follow_up(job.project_id).await?;
        }

        Ok(InvocationOutcome::Executed {
            job_id: job.id,
            project_id: job.project_id,
            job_type: job.job_type,
            result,
        })
    }

    /// 没有可领取任务时，判断是空闲还是都在退避
    async fn idle_outcome(
        &self,
        project_id: Option<Uuid>,
    ) -> Result<InvocationOutcome, WorkerError> {
        let now = self.clock.now();
        match self.lease_store.next_eligible_at(project_id).await? {
            Some(at) if at > now => Ok(InvocationOutcome::Deferred {
                retry_in: (at - now).to_std().unwrap_or_default(),
            }),
            _ => Ok(InvocationOutcome::Idle),
        }
    }

    /// 剩余任务可立即领取时马上触发，全部在退避中时延迟触发
    async fn fire_follow_up(&self, project_id: Uuid) -> Result<(), WorkerError> {
        let now = self.clock.now();
        let request = match self.lease_store.next_eligible_at(Some(project_id)).await? {
            Some(at) if at > now => {
                TriggerRequest::after(Some(project_id), (at - now).to_std().unwrap_or_default())
            }
            _ => TriggerRequest::now(Some(project_id)),
        };

        // 触发丢失由周期清扫兜底
        if let Err(e) = self.trigger.fire(request) {
            tracing::warn!(project_id = %project_id, error = %e, "Failed to fire worker trigger");
        }
        Ok(())
    }

    async fn load_context(
        &self,
        job: &JobRecord,
    ) -> Result<Option<(ProjectRecord, ChapterRecord, usize, usize)>, WorkerError> {
        let Some(project) = self.project_repo.find_by_id(job.project_id).await? else {
            return Ok(None);
        };
        let chapters = self.chapter_repo.find_by_project(job.project_id).await?;
        let total = chapters.len();
        let found = chapters
            .into_iter()
            .enumerate()
            .find(|(_, chapter)| chapter.id == job.chapter_id);

        Ok(found.map(|(position, chapter)| (project, chapter, position, total)))
    }

    async fn run_outline_job(&self, job: &JobRecord, owner: &str) -> Result<JobResult, WorkerError> {
        let Some((project, chapter, position, total)) = self.load_context(job).await? else {
            return self.give_up(job, owner, "chapter not found").await;
        };

        self.chapter_repo
            .transition_status(
                chapter.id,
                &[ChapterStatus::Pending],
                ChapterStatus::GeneratingOutline,
            )
            .await?;

        // 大纲一旦落盘不可变，重复执行时直接复用
        let scenes = match chapter.scene_outline.clone() {
            Some(scenes) => scenes,
            None => {
                let request = outline_request(&project, &chapter, position, total);
                match self.generator.generate_outline(&request).await {
                    Ok(scenes) => scenes,
                    Err(e) => return self.handle_failure(job, owner, e).await,
                }
            }
        };

        self.chapter_repo
            .store_scene_outline(chapter.id, &scenes)
            .await?;
        let chapter = self
            .chapter_repo
            .find_by_id(chapter.id)
            .await?
            .ok_or(WorkerError::ChapterNotFound(job.chapter_id))?;
        let scenes = chapter.scene_outline.clone().unwrap_or(scenes);

        let jobs_created = self.planner.fan_out(&chapter, &scenes).await?;
        self.chapter_repo
            .transition_status(
                chapter.id,
                &[ChapterStatus::Pending, ChapterStatus::GeneratingOutline],
                ChapterStatus::OutlineReady,
            )
            .await?;
        if scenes.is_empty() {
            // 没有场景任务来收尾，由大纲任务直接结束章节
            self.close_chapter_if_done(&chapter, position).await?;
        }

        if !self.lease_store.complete(job.id, owner).await? {
            tracing::warn!(job_id = %job.id, "Outline job lease lost before completion");
            return Ok(JobResult::LeaseLost);
        }

        tracing::info!(
            job_id = %job.id,
            project_id = %job.project_id,
            chapter_id = %chapter.id,
            scenes = scenes.len(),
            jobs_created = jobs_created,
            "Chapter outline stored"
        );

        self.finish_outline_phase(job.project_id).await?;

        Ok(JobResult::OutlineStored {
            scenes: scenes.len(),
            jobs_created,
        })
    }

    /// 所有章节都有大纲且没有活跃大纲任务时进入写作阶段
    async fn finish_outline_phase(&self, project_id: Uuid) -> Result<(), WorkerError> {
        let counts = self.lease_store.job_counts(project_id).await?;
        if counts.active_outlines > 0 {
            return Ok(());
        }
        if self.chapter_repo.count_without_outline(project_id).await? > 0 {
            return Ok(());
        }

        let moved = self
            .project_repo
            .transition_status(
                project_id,
                &[ProjectStatus::GeneratingOutlines],
                ProjectStatus::Writing,
                None,
            )
            .await?;
        if moved {
            tracing::info!(project_id = %project_id, "All outlines ready, writing scenes");
        }
        Ok(())
    }

    async fn run_scene_job(&self, job: &JobRecord, owner: &str) -> Result<JobResult, WorkerError> {
        let Some((project, chapter, position, _)) = self.load_context(job).await? else {
            return self.give_up(job, owner, "chapter not found").await;
        };
        let index = job.scene_index.unwrap_or(0);

        let settled = self.chapter_repo.settled_scenes(chapter.id).await?;
        if settled.contains(&index) {
            // 正文已追加但上一个持有者没能结算
            return self.settle_written(job, owner, &chapter, position).await;
        }

        let scene = match job
            .scene_outline
            .clone()
            .or_else(|| chapter.scene_outline.as_ref()?.get(index).cloned())
        {
            Some(scene) => scene,
            None => return self.give_up(job, owner, "scene descriptor missing").await,
        };

        self.chapter_repo
            .transition_status(
                chapter.id,
                &[
                    ChapterStatus::Pending,
                    ChapterStatus::GeneratingOutline,
                    ChapterStatus::OutlineReady,
                ],
                ChapterStatus::Writing,
            )
            .await?;

        let request = scene_request(&project, &chapter, position, &scene);
        let draft = match self.generator.write_scene(&request).await {
            Ok(draft) => draft,
            Err(e) => return self.handle_failure(job, owner, e).await,
        };

        let appended = self
            .accumulator
            .append_scene(
                chapter.id,
                index,
                &scene_fragment(index, &draft.text),
                draft.word_count,
            )
            .await?;
        if !appended {
            tracing::warn!(job_id = %job.id, scene_index = index, "Scene settled by another holder, draft discarded");
            return self.settle_written(job, owner, &chapter, position).await;
        }

        if !self.lease_store.complete(job.id, owner).await? {
            tracing::warn!(job_id = %job.id, scene_index = index, "Scene job lease lost before completion");
            return Ok(JobResult::LeaseLost);
        }
        self.project_repo
            .increment_scene_counters(project.id, 1, 0)
            .await?;
        self.close_chapter_if_done(&chapter, position).await?;

        tracing::info!(
            job_id = %job.id,
            project_id = %project.id,
            chapter_id = %chapter.id,
            scene_index = index,
            word_count = draft.word_count,
            "Scene written"
        );

        Ok(JobResult::SceneWritten {
            word_count: draft.word_count,
        })
    }

    /// 场景正文已在库中：只结算任务，计数归赢得 complete 的一方
    async fn settle_written(
        &self,
        job: &JobRecord,
        owner: &str,
        chapter: &ChapterRecord,
        position: usize,
    ) -> Result<JobResult, WorkerError> {
        if !self.lease_store.complete(job.id, owner).await? {
            return Ok(JobResult::LeaseLost);
        }
        self.project_repo
            .increment_scene_counters(job.project_id, 1, 0)
            .await?;
        self.close_chapter_if_done(chapter, position).await?;
        tracing::info!(job_id = %job.id, scene_index = ?job.scene_index, "Scene already written, settled");
        Ok(JobResult::AlreadyWritten)
    }

    /// 每个场景都已结算（写入或跳过）时结束章节
    async fn close_chapter_if_done(
        &self,
        chapter: &ChapterRecord,
        position: usize,
    ) -> Result<(), WorkerError> {
        let settled = self.chapter_repo.settled_scenes(chapter.id).await?;
        if settled.len() < chapter.scene_count() {
            return Ok(());
        }
        self.chapter_repo
            .transition_status(
                chapter.id,
                &[ChapterStatus::OutlineReady, ChapterStatus::Writing],
                ChapterStatus::Completed,
            )
            .await?;
        self.project_repo
            .advance_chapter_index(chapter.project_id, position + 1)
            .await?;
        Ok(())
    }

    /// 按重试策略处理生成失败
    async fn handle_failure(
        &self,
        job: &JobRecord,
        owner: &str,
        error: GeneratorError,
    ) -> Result<JobResult, WorkerError> {
        let decision = self.policy.with_max_attempts(job.max_attempts).decide(
            error.failure_class(),
            job.attempts,
            error.retry_after(),
        );
        let message = error.to_string();

        match self.lease_store.fail(job.id, owner, &message, decision).await? {
            FailOutcome::Rescheduled {
                attempts,
                next_retry_at,
            } => {
                tracing::warn!(
                    job_id = %job.id,
                    job_type = job.job_type.as_str(),
                    attempts = attempts,
                    next_retry_at = %next_retry_at,
                    error = %message,
                    "Job failed, rescheduled"
                );
                Ok(JobResult::Rescheduled { attempts })
            }
            FailOutcome::Exhausted { attempts } => {
                self.on_exhausted(job, &message).await?;
                Ok(JobResult::Exhausted { attempts })
            }
            FailOutcome::LeaseLost => Ok(JobResult::LeaseLost),
        }
    }

    /// 不可恢复的失败，直接终止任务
    async fn give_up(
        &self,
        job: &JobRecord,
        owner: &str,
        reason: &str,
    ) -> Result<JobResult, WorkerError> {
        match self
            .lease_store
            .fail(job.id, owner, reason, RetryDecision::GiveUp)
            .await?
        {
            FailOutcome::Exhausted { attempts } => {
                self.on_exhausted(job, reason).await?;
                Ok(JobResult::Exhausted { attempts })
            }
            FailOutcome::Rescheduled { attempts, .. } => Ok(JobResult::Rescheduled { attempts }),
            FailOutcome::LeaseLost => Ok(JobResult::LeaseLost),
        }
    }

    /// 预算耗尽：大纲任务升级为项目失败，场景任务只计入 failed_scenes
    async fn on_exhausted(&self, job: &JobRecord, message: &str) -> Result<(), WorkerError> {
        match job.job_type {
            JobType::GenerateOutline => {
                self.chapter_repo
                    .transition_status(
                        job.chapter_id,
                        &[ChapterStatus::Pending, ChapterStatus::GeneratingOutline],
                        ChapterStatus::Failed,
                    )
                    .await?;
                let reason = format!("outline generation failed: {}", message);
                let failed = self
                    .project_repo
                    .transition_status(
                        job.project_id,
                        &ProjectStatus::ACTIVE,
                        ProjectStatus::Failed,
                        Some(&reason),
                    )
                    .await?;

                tracing::error!(
                    job_id = %job.id,
                    project_id = %job.project_id,
                    chapter_id = %job.chapter_id,
                    project_failed = failed,
                    error = %message,
                    "Outline job exhausted"
                );
            }
            JobType::WriteScene => {
                let index = job.scene_index.unwrap_or(0);
                self.project_repo
                    .increment_scene_counters(job.project_id, 0, 1)
                    .await?;
                self.accumulator
                    .skip_scene(job.chapter_id, index)
                    .await?;
                if let Some(chapter) = self.chapter_repo.find_by_id(job.chapter_id).await? {
                    let position = self
                        .chapter_repo
                        .find_by_project(job.project_id)
                        .await?
                        .iter()
                        .position(|c| c.id == chapter.id)
                        .unwrap_or(0);
                    self.close_chapter_if_done(&chapter, position).await?;
                }

                tracing::error!(
                    job_id = %job.id,
                    project_id = %job.project_id,
                    chapter_id = %job.chapter_id,
                    scene_index = index,
                    error = %message,
                    "Scene job exhausted"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{JobStatus, LeaseFilter};
    use crate::domain::outline::SceneDescriptor;
    use crate::infrastructure::persistence::sqlite::LeaseStoreConfig;
    use crate::test_support::{Harness, ScriptedGenerator};

    fn scenes(n: usize) -> Vec<SceneDescriptor> {
        (1..=n)
            .map(|i| SceneDescriptor::new(i as u32, format!("Scene {}", i), 300))
            .collect()
    }

    async fn drain(worker: &LeasedWorker, project_id: Uuid) -> Vec<InvocationOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..64 {
            let outcome = worker.run_once(LeaseFilter::project(project_id)).await.unwrap();
            if !matches!(outcome, InvocationOutcome::Executed { .. }) {
                outcomes.push(outcome);
                break;
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    #[tokio::test]
    async fn test_outline_job_fans_out_ordered_scene_jobs() {
        let h = Harness::new().await;
        let (project, chapters) = h.seed_project(1000, 1).await;
        h.generator.push_outline(Ok(scenes(3)));
        h.start(project.id, true).await;

        let worker = h.worker();
        let outcome = worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
        assert!(matches!(
            outcome,
            InvocationOutcome::Executed {
                job_type: JobType::GenerateOutline,
                result: JobResult::OutlineStored { scenes: 3, jobs_created: 3 },
                ..
            }
        ));

        let jobs: Vec<_> = h
            .lease_store
            .find_by_project(project.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|j| j.job_type == JobType::WriteScene)
            .collect();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.chapter_id == chapters[0].id));
        assert!(jobs.windows(2).all(|w| w[0].sort_order < w[1].sort_order));
        let indices: Vec<_> = jobs.iter().map(|j| j.scene_index).collect();
        assert_eq!(indices, vec![Some(0), Some(1), Some(2)]);

        let project = h.project_repo.find_by_id(project.id).await.unwrap().unwrap();
        assert_eq!(project.writing_status, ProjectStatus::Writing);
        assert_eq!(project.total_scenes, 3);
    }

    #[tokio::test]
    async fn test_full_pipeline_completes_and_notifies_once() {
        let h = Harness::new().await;
        let (project, chapters) = h.seed_project(1000, 2).await;
        h.generator.set_default_outline(scenes(2));
        h.generator.set_default_scene_words(200);
        h.start(project.id, true).await;

        let worker = h.worker();
        let outcomes = drain(&worker, project.id).await;
        assert_eq!(outcomes.last(), Some(&InvocationOutcome::Idle));

        let project = h.project_repo.find_by_id(project.id).await.unwrap().unwrap();
        assert_eq!(project.writing_status, ProjectStatus::Completed);
        assert_eq!(project.completed_scenes, 4);
        assert_eq!(project.word_count, 800);
        assert_eq!(h.notifier.notices().len(), 1);

        let chapter = h.chapter_repo.find_by_id(chapters[1].id).await.unwrap().unwrap();
        assert_eq!(chapter.writing_status, ChapterStatus::Completed);
        assert_eq!(chapter.current_scene_index, 2);
        assert!(!chapter.content.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limits_do_not_consume_budget() {
        let h = Harness::new().await;
        let (project, _) = h.seed_project(1000, 1).await;
        h.generator.push_outline(Ok(scenes(1)));
        h.start(project.id, true).await;

        let worker = h.worker();
        worker.run_once(LeaseFilter::project(project.id)).await.unwrap();

        for _ in 0..3 {
            h.generator
                .push_scene(Err(GeneratorError::RateLimited { retry_after: None }));
        }
        h.generator.push_scene(Ok(ScriptedGenerator::draft(800)));

        for round in 0..3 {
            let outcome = worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
            assert!(
                matches!(
                    outcome,
                    InvocationOutcome::Executed {
                        result: JobResult::Rescheduled { attempts: 0 },
                        ..
                    }
                ),
                "round {}: {:?}",
                round,
                outcome
            );
            // 退避期间不可领取
            let idle = worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
            assert!(matches!(idle, InvocationOutcome::Deferred { .. }));
            h.clock.advance(chrono::Duration::seconds(61));
        }

        let outcome = worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
        assert!(matches!(
            outcome,
            InvocationOutcome::Executed {
                result: JobResult::SceneWritten { word_count: 800 },
                ..
            }
        ));

        let job = h
            .lease_store
            .find_by_project(project.id)
            .await
            .unwrap()
            .into_iter()
            .find(|j| j.job_type == JobType::WriteScene)
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 0);

        let project = h.project_repo.find_by_id(project.id).await.unwrap().unwrap();
        assert_eq!(project.writing_status, ProjectStatus::Completed);
    }

    #[tokio::test]
    async fn test_exhausted_scene_counts_failure_and_pipeline_continues() {
        let h = Harness::new().await;
        let (project, chapters) = h.seed_project(100_000, 2).await;
        h.generator.set_default_outline(scenes(2));
        h.start(project.id, true).await;

        let worker = h.worker();
        // 两个大纲任务
        worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
        worker.run_once(LeaseFilter::project(project.id)).await.unwrap();

        for _ in 0..15 {
            h.generator
                .push_scene(Err(GeneratorError::NetworkError("connection reset".into())));
        }

        let mut last = None;
        for _ in 0..15 {
            let outcome = worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
            h.clock.advance(chrono::Duration::minutes(6));
            last = Some(outcome);
        }
        assert!(matches!(
            last,
            Some(InvocationOutcome::Executed {
                result: JobResult::Exhausted { attempts: 15 },
                ..
            })
        ));

        let project_now = h.project_repo.find_by_id(project.id).await.unwrap().unwrap();
        assert_eq!(project_now.failed_scenes, 1);
        assert_eq!(project_now.writing_status, ProjectStatus::Writing);

        let failed = h
            .lease_store
            .find_unit(chapters[0].id, JobType::WriteScene, Some(0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, JobStatus::Failed);

        // 下一个场景继续推进
        let outcome = worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
        assert!(matches!(
            outcome,
            InvocationOutcome::Executed {
                result: JobResult::SceneWritten { .. },
                ..
            }
        ));
        let chapter = h.chapter_repo.find_by_id(chapters[0].id).await.unwrap().unwrap();
        assert_eq!(chapter.current_scene_index, 2);
    }

    #[tokio::test]
    async fn test_exhausted_outline_fails_project() {
        let h = Harness::new().await;
        let (project, _) = h.seed_project(1000, 1).await;
        h.generator
            .push_outline(Err(GeneratorError::InvalidResponse("not json".into())));
        h.start(project.id, true).await;

        let worker = h.worker();
        let job = h
            .lease_store
            .find_by_project(project.id)
            .await
            .unwrap()
            .remove(0);
        assert_eq!(job.max_attempts, 15);

        for _ in 0..14 {
            h.generator
                .push_outline(Err(GeneratorError::InvalidResponse("not json".into())));
        }
        for _ in 0..15 {
            worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
            h.clock.advance(chrono::Duration::minutes(6));
        }

        let project = h.project_repo.find_by_id(project.id).await.unwrap().unwrap();
        assert_eq!(project.writing_status, ProjectStatus::Failed);
        assert!(project
            .failure_reason
            .unwrap()
            .starts_with("outline generation failed"));
        assert!(h.notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_paused_project_refuses_leases() {
        let h = Harness::new().await;
        let (project, _) = h.seed_project(1000, 2).await;
        h.start(project.id, true).await;
        h.pause(project.id).await;

        let worker = h.worker();
        let outcome = worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
        assert_eq!(outcome, InvocationOutcome::Idle);
        assert_eq!(h.generator.outline_calls(), 0);

        h.resume(project.id, true).await;
        let outcome = worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
        assert!(matches!(outcome, InvocationOutcome::Executed { .. }));
    }

    #[tokio::test]
    async fn test_follow_up_trigger_fired_while_work_remains() {
        let h = Harness::new().await;
        let (project, _) = h.seed_project(1000, 2).await;
        h.start(project.id, true).await;
        let before = h.trigger.requests().len();

        let worker = h.worker();
        worker.run_once(LeaseFilter::project(project.id)).await.unwrap();

        let requests = h.trigger.requests();
        assert_eq!(requests.len(), before + 1);
        assert_eq!(
            requests.last().copied(),
            Some(TriggerRequest::now(Some(project.id)))
        );
    }

    #[tokio::test]
    async fn test_unserialized_retry_keeps_earlier_scene() {
        let h = Harness::with_lease_config(LeaseStoreConfig {
            serialize_chapters: false,
            ..LeaseStoreConfig::default()
        })
        .await;
        let (project, chapters) = h.seed_project(1000, 1).await;
        h.generator.push_outline(Ok(scenes(2)));
        h.start(project.id, true).await;

        let worker = h.worker();
        worker.run_once(LeaseFilter::project(project.id)).await.unwrap();

        h.generator.push_scene(Err(GeneratorError::Timeout));
        h.generator.push_scene(Ok(ScriptedGenerator::draft(400)));
        h.generator.push_scene(Ok(ScriptedGenerator::draft(400)));

        let first = worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
        assert!(matches!(
            first,
            InvocationOutcome::Executed {
                result: JobResult::Rescheduled { attempts: 1 },
                ..
            }
        ));
        // 场景 0 退避期间，场景 1 先写完
        let second = worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
        assert!(matches!(
            second,
            InvocationOutcome::Executed {
                result: JobResult::SceneWritten { word_count: 400 },
                ..
            }
        ));

        h.clock.advance(chrono::Duration::minutes(6));
        let retried = worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
        assert!(
            matches!(
                retried,
                InvocationOutcome::Executed {
                    result: JobResult::SceneWritten { word_count: 400 },
                    ..
                }
            ),
            "{:?}",
            retried
        );

        let chapter = h.chapter_repo.find_by_id(chapters[0].id).await.unwrap().unwrap();
        assert_eq!(chapter.word_count, 800);
        assert_eq!(chapter.writing_status, ChapterStatus::Completed);

        let project = h.project_repo.find_by_id(project.id).await.unwrap().unwrap();
        assert_eq!(project.completed_scenes, 2);
        assert_eq!(project.writing_status, ProjectStatus::Completed);
    }

    #[tokio::test]
    async fn test_written_scene_of_crashed_holder_is_settled_without_rewriting() {
        let h = Harness::new().await;
        let (project, chapters) = h.seed_project(4, 1).await;
        h.generator.push_outline(Ok(scenes(1)));
        h.start(project.id, true).await;

        let worker = h.worker();
        worker.run_once(LeaseFilter::project(project.id)).await.unwrap();

        // 持有者追加正文后崩溃，任务仍是 processing
        h.lease_store
            .lease_next(&LeaseFilter::project(project.id), "crashed")
            .await
            .unwrap()
            .unwrap();
        assert!(h
            .chapter_repo
            .append_scene(chapters[0].id, 0, "Lamps were lit", 3)
            .await
            .unwrap());

        h.clock.advance(chrono::Duration::minutes(6));
        let outcome = worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
        assert!(matches!(
            outcome,
            InvocationOutcome::Executed {
                result: JobResult::AlreadyWritten,
                ..
            }
        ));
        assert_eq!(h.generator.scene_calls(), 0);

        let chapter = h.chapter_repo.find_by_id(chapters[0].id).await.unwrap().unwrap();
        assert_eq!(chapter.content, "Lamps were lit");
        assert_eq!(chapter.word_count, 3);
        assert_eq!(chapter.writing_status, ChapterStatus::Completed);

        let project = h.project_repo.find_by_id(project.id).await.unwrap().unwrap();
        assert_eq!(project.completed_scenes, 1);
        assert_eq!(project.writing_status, ProjectStatus::Completed);
    }

    #[tokio::test]
    async fn test_empty_outline_closes_chapter() {
        let h = Harness::new().await;
        let (project, chapters) = h.seed_project(1000, 2).await;
        h.generator.push_outline(Ok(Vec::new()));
        h.start(project.id, true).await;

        let worker = h.worker();
        let outcome = worker.run_once(LeaseFilter::project(project.id)).await.unwrap();
        assert!(matches!(
            outcome,
            InvocationOutcome::Executed {
                result: JobResult::OutlineStored { scenes: 0, jobs_created: 0 },
                ..
            }
        ));

        let chapter = h.chapter_repo.find_by_id(chapters[0].id).await.unwrap().unwrap();
        assert_eq!(chapter.writing_status, ChapterStatus::Completed);
        let project = h.project_repo.find_by_id(project.id).await.unwrap().unwrap();
        assert_eq!(project.current_chapter_index, 1);
    }
}
