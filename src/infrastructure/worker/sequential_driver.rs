//! Sequential Driver - 长时间运行的顺序驱动器
//!
//! 按章节顺序先补齐所有大纲，再逐个写出尚未结算的场景。
//! 每个工作单元之前检查项目状态，暂停时在下一个检查点干净退出。
//!
//! 某个单元已有排队任务时通过 lease_job 接管（过期租约一并回收），
//! 被活跃工作者持有的单元直接跳过。退避等待期间把接管的任务交还队列。
//! 同一进程内每个项目至多运行一个顺序驱动器

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::WorkerError;
use crate::application::ports::{
    ChapterRecord, ChapterRepositoryPort, ChapterStatus, Clock, ContentAccumulatorPort,
    FailOutcome, GeneratorError, GeneratorPort, JobRecord, JobStatus, JobType, LeaseStorePort,
    ProjectRecord, ProjectRepositoryPort, ProjectStatus,
};
use crate::application::services::{outline_request, scene_request, ProgressAggregator};
use crate::domain::outline::SceneDescriptor;
use crate::domain::scene_fragment;
use crate::domain::scheduling::{RetryDecision, RetryPolicy};

/// 顺序驱动器配置
#[derive(Debug, Clone)]
pub struct SequentialDriverConfig {
    /// 租约持有者前缀
    pub owner: String,
    /// 场景之间的间隔
    pub scene_delay: Duration,
    /// 章节之间的间隔
    pub chapter_delay: Duration,
    /// 大纲生成的尝试预算
    pub outline_attempts: u32,
    /// 场景生成的尝试预算
    pub scene_attempts: u32,
}

impl Default for SequentialDriverConfig {
    fn default() -> Self {
        Self {
            owner: "sequential".to_string(),
            scene_delay: Duration::from_secs(8),
            chapter_delay: Duration::from_secs(15),
            outline_attempts: 3,
            scene_attempts: 3,
        }
    }
}

/// 一次运行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 遍历结束；项目可能已结算，也可能还有单元由其它工作者持有
    Finished(ProjectStatus),
    /// 项目被暂停，在检查点退出
    Paused,
    /// 项目已不在活跃状态（取消、失败或已结算）
    Stopped(ProjectStatus),
}

/// 单元认领结果
enum UnitClaim {
    /// 没有排队任务，驱动器直接执行
    Unqueued,
    /// 接管了排队任务
    Held(JobRecord),
    /// 被其它工作者持有
    Busy,
    /// 任务已终结
    Settled(JobStatus),
}

/// 带重试的生成结果
enum Attempt<T> {
    Done(T),
    Exhausted(GeneratorError),
    Interrupted(RunOutcome),
    /// 退避后没能重新领回任务，单元交给新的持有者
    Yielded,
}

/// 运行守卫，drop 时释放项目
pub struct RunGuard {
    running: Arc<DashMap<Uuid, DateTime<Utc>>>,
    project_id: Uuid,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.remove(&self.project_id);
    }
}

/// 顺序驱动器
pub struct SequentialDriver {
    config: SequentialDriverConfig,
    project_repo: Arc<dyn ProjectRepositoryPort>,
    chapter_repo: Arc<dyn ChapterRepositoryPort>,
    accumulator: Arc<dyn ContentAccumulatorPort>,
    lease_store: Arc<dyn LeaseStorePort>,
    generator: Arc<dyn GeneratorPort>,
    aggregator: Arc<ProgressAggregator>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    running: Arc<DashMap<Uuid, DateTime<Utc>>>,
}

impl SequentialDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SequentialDriverConfig,
        project_repo: Arc<dyn ProjectRepositoryPort>,
        chapter_repo: Arc<dyn ChapterRepositoryPort>,
        accumulator: Arc<dyn ContentAccumulatorPort>,
        lease_store: Arc<dyn LeaseStorePort>,
        generator: Arc<dyn GeneratorPort>,
        aggregator: Arc<ProgressAggregator>,
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
            aggregator,
            policy,
            clock,
            running: Arc::new(DashMap::new()),
        }
    }

    /// 项目是否有运行中的顺序驱动器
    pub fn is_running(&self, project_id: Uuid) -> bool {
        self.running.contains_key(&project_id)
    }

    fn acquire(&self, project_id: Uuid) -> Result<RunGuard, WorkerError> {
        match self.running.entry(project_id) {
            Entry::Occupied(_) => Err(WorkerError::AlreadyRunning(project_id)),
            Entry::Vacant(slot) => {
                slot.insert(self.clock.now());
                Ok(RunGuard {
                    running: self.running.clone(),
                    project_id,
                })
            }
        }
    }

    /// 在当前任务中运行到结束、暂停或停止
    pub async fn run(&self, project_id: Uuid) -> Result<RunOutcome, WorkerError> {
        let _guard = self.acquire(project_id)?;
        self.walk(project_id).await
    }

    /// 在后台运行；守卫在返回前就已取得，重复启动立即报错
    pub fn spawn(self: &Arc<Self>, project_id: Uuid) -> Result<(), WorkerError> {
        let guard = self.acquire(project_id)?;
        let driver = self.clone();

        tokio::spawn(async move {
            let _guard = guard;
            match driver.walk(project_id).await {
                Ok(outcome) => {
                    tracing::info!(project_id = %project_id, outcome = ?outcome, "Sequential run finished");
                }
                Err(e) => {
                    tracing::error!(project_id = %project_id, error = %e, "Sequential run aborted");
                }
            }
        });

        Ok(())
    }

    async fn walk(&self, project_id: Uuid) -> Result<RunOutcome, WorkerError> {
        let owner = format!("{}-{}", self.config.owner, Uuid::new_v4().simple());
        tracing::info!(project_id = %project_id, owner = %owner, "Sequential run started");

        if let Some(stop) = self.outline_phase(project_id, &owner).await? {
            return Ok(stop);
        }
        if let Some(stop) = self.scene_phase(project_id, &owner).await? {
            return Ok(stop);
        }

        let outcome = self.aggregator.settle(project_id).await?;
        Ok(RunOutcome::Finished(outcome.status))
    }

    /// 检查点：项目不再活跃时返回退出结果
    async fn checkpoint(&self, project_id: Uuid) -> Result<Option<RunOutcome>, WorkerError> {
        let project = self.load_project(project_id).await?;
        Ok(match project.writing_status {
            status if status.is_active() => None,
            ProjectStatus::Paused => Some(RunOutcome::Paused),
            status => Some(RunOutcome::Stopped(status)),
        })
    }

    async fn load_project(&self, project_id: Uuid) -> Result<ProjectRecord, WorkerError> {
        self.project_repo
            .find_by_id(project_id)
            .await?
            .ok_or(WorkerError::ProjectNotFound(project_id))
    }

    async fn load_chapter(&self, chapter_id: Uuid) -> Result<ChapterRecord, WorkerError> {
        self.chapter_repo
            .find_by_id(chapter_id)
            .await?
            .ok_or(WorkerError::ChapterNotFound(chapter_id))
    }

    async fn pace(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn claim_unit(
        &self,
        chapter_id: Uuid,
        job_type: JobType,
        scene_index: Option<usize>,
        owner: &str,
    ) -> Result<UnitClaim, WorkerError> {
        let Some(job) = self
            .lease_store
            .find_unit(chapter_id, job_type, scene_index)
            .await?
        else {
            return Ok(UnitClaim::Unqueued);
        };

        match job.status {
            status @ (JobStatus::Completed | JobStatus::Failed) => Ok(UnitClaim::Settled(status)),
            JobStatus::Processing if job.lease_owner.as_deref() == Some(owner) => {
                Ok(UnitClaim::Held(job))
            }
            // 其它持有者的租约过期时 lease_job 会先回收
            _ => match self.lease_store.lease_job(job.id, owner).await? {
                Some(job) => Ok(UnitClaim::Held(job)),
                None => Ok(UnitClaim::Busy),
            },
        }
    }

    /// 把接管的任务放回队列，不消耗预算
    async fn hand_back(
        &self,
        job: &JobRecord,
        owner: &str,
        reason: &str,
        delay: chrono::Duration,
    ) -> Result<(), WorkerError> {
        let decision = RetryDecision::Retry {
            delay,
            consume_attempt: false,
        };
        self.lease_store.fail(job.id, owner, reason, decision).await?;
        Ok(())
    }

    /// 中断时交还接管的任务
    async fn release(&self, held: Option<JobRecord>, owner: &str) -> Result<(), WorkerError> {
        if let Some(job) = held {
            self.hand_back(&job, owner, "sequential run interrupted", chrono::Duration::zero())
                .await?;
        }
        Ok(())
    }

    /// 有界重试：背压等待不计入预算，其它失败计入预算
    ///
    /// 等待前交还 `held`，等待结束后重新领取；领不回来时返回 `Yielded`
    async fn with_retry<T, F, Fut>(
        &self,
        project_id: Uuid,
        budget: u32,
        held: &mut Option<JobRecord>,
        owner: &str,
        mut call: F,
    ) -> Result<Attempt<T>, WorkerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GeneratorError>>,
    {
        let policy = self.policy.with_max_attempts(budget);
        let mut attempts = 0;

        loop {
            let error = match call().await {
                Ok(value) => return Ok(Attempt::Done(value)),
                Err(e) => e,
            };

            match policy.decide(error.failure_class(), attempts, error.retry_after()) {
                RetryDecision::GiveUp => return Ok(Attempt::Exhausted(error)),
                RetryDecision::Retry {
                    delay,
                    consume_attempt,
                } => {
                    if consume_attempt {
                        attempts += 1;
                    }
                    tracing::warn!(
                        project_id = %project_id,
                        attempts = attempts,
                        delay_secs = delay.num_seconds(),
                        error = %error,
                        "Generation failed, retrying"
                    );
                    let released = held.take();
                    if let Some(job) = &released {
                        self.hand_back(job, owner, &error.to_string(), delay).await?;
                    }
                    self.pace(delay.to_std().unwrap_or_default()).await;

                    if let Some(stop) = self.checkpoint(project_id).await? {
                        return Ok(Attempt::Interrupted(stop));
                    }
                    if let Some(job) = released {
                        match self.lease_store.lease_job(job.id, owner).await? {
                            Some(job) => *held = Some(job),
                            None => return Ok(Attempt::Yielded),
                        }
                    }
                }
            }
        }
    }

    async fn outline_phase(
        &self,
        project_id: Uuid,
        owner: &str,
    ) -> Result<Option<RunOutcome>, WorkerError> {
        let chapters = self.chapter_repo.find_by_project(project_id).await?;
        let total = chapters.len();

        for (position, chapter) in chapters.iter().enumerate() {
            if chapter.has_outline() || chapter.writing_status == ChapterStatus::Failed {
                continue;
            }
            if let Some(stop) = self.checkpoint(project_id).await? {
                return Ok(Some(stop));
            }

            let mut held = match self
                .claim_unit(chapter.id, JobType::GenerateOutline, None, owner)
                .await?
            {
                UnitClaim::Busy => {
                    tracing::debug!(chapter_id = %chapter.id, "Outline held by another worker, skipping");
                    continue;
                }
                UnitClaim::Settled(_) => continue,
                UnitClaim::Held(job) => Some(job),
                UnitClaim::Unqueued => None,
            };

            let project = self.load_project(project_id).await?;
            self.chapter_repo
                .transition_status(
                    chapter.id,
                    &[ChapterStatus::Pending],
                    ChapterStatus::GeneratingOutline,
                )
                .await?;

            let request = outline_request(&project, chapter, position, total);
            let request = &request;
            let attempt = self
                .with_retry(project_id, self.config.outline_attempts, &mut held, owner, || {
                    self.generator.generate_outline(request)
                })
                .await?;

            match attempt {
                Attempt::Done(scenes) => {
                    // 空大纲的章节在场景阶段收尾
                    self.chapter_repo
                        .store_scene_outline(chapter.id, &scenes)
                        .await?;
                    self.chapter_repo
                        .transition_status(
                            chapter.id,
                            &[ChapterStatus::GeneratingOutline],
                            ChapterStatus::OutlineReady,
                        )
                        .await?;
                    if let Some(job) = held {
                        self.lease_store.complete(job.id, owner).await?;
                    }

                    tracing::info!(
                        project_id = %project_id,
                        chapter_id = %chapter.id,
                        scenes = scenes.len(),
                        "Chapter outline stored"
                    );
                }
                Attempt::Exhausted(error) => {
                    self.chapter_repo
                        .transition_status(
                            chapter.id,
                            &[ChapterStatus::GeneratingOutline],
                            ChapterStatus::Failed,
                        )
                        .await?;
                    if let Some(job) = held {
                        self.lease_store
                            .fail(job.id, owner, &error.to_string(), RetryDecision::GiveUp)
                            .await?;
                    }
                    let reason = format!("outline generation failed: {}", error);
                    self.project_repo
                        .transition_status(
                            project_id,
                            &ProjectStatus::ACTIVE,
                            ProjectStatus::Failed,
                            Some(&reason),
                        )
                        .await?;
                    self.aggregator.settle(project_id).await?;

                    tracing::error!(
                        project_id = %project_id,
                        chapter_id = %chapter.id,
                        error = %error,
                        "Outline generation exhausted, project failed"
                    );
                    return Ok(Some(RunOutcome::Stopped(ProjectStatus::Failed)));
                }
                Attempt::Interrupted(stop) => {
                    self.release(held, owner).await?;
                    self.chapter_repo
                        .transition_status(
                            chapter.id,
                            &[ChapterStatus::GeneratingOutline],
                            ChapterStatus::Pending,
                        )
                        .await?;
                    return Ok(Some(stop));
                }
                Attempt::Yielded => {
                    tracing::debug!(chapter_id = %chapter.id, "Outline taken over during backoff, skipping");
                    self.chapter_repo
                        .transition_status(
                            chapter.id,
                            &[ChapterStatus::GeneratingOutline],
                            ChapterStatus::Pending,
                        )
                        .await?;
                }
            }
        }

        if self.chapter_repo.count_without_outline(project_id).await? == 0 {
            self.project_repo
                .transition_status(
                    project_id,
                    &[ProjectStatus::GeneratingOutlines],
                    ProjectStatus::Writing,
                    None,
                )
                .await?;
        }
        Ok(None)
    }

    async fn scene_phase(
        &self,
        project_id: Uuid,
        owner: &str,
    ) -> Result<Option<RunOutcome>, WorkerError> {
        let chapters = self.chapter_repo.find_by_project(project_id).await?;
        let mut walked_chapter = false;

        for (position, chapter) in chapters.iter().enumerate() {
            let Some(scenes) = chapter.scene_outline.as_deref() else {
                continue;
            };
            if matches!(
                chapter.writing_status,
                ChapterStatus::Completed | ChapterStatus::Failed
            ) {
                continue;
            }
            let settled = self.chapter_repo.settled_scenes(chapter.id).await?;
            if settled.len() >= scenes.len() {
                for &index in &settled {
                    self.adopt_settled(project_id, chapter.id, index, owner)
                        .await?;
                }
                self.close_chapter(chapter, position).await?;
                continue;
            }

            if walked_chapter {
                self.pace(self.config.chapter_delay).await;
            }
            walked_chapter = true;

            self.project_repo
                .advance_chapter_index(project_id, position)
                .await?;
            if let Some(stop) = self
                .write_chapter(project_id, position, chapter.id, scenes, owner)
                .await?
            {
                return Ok(Some(stop));
            }
        }
        Ok(None)
    }

    async fn write_chapter(
        &self,
        project_id: Uuid,
        position: usize,
        chapter_id: Uuid,
        scenes: &[SceneDescriptor],
        owner: &str,
    ) -> Result<Option<RunOutcome>, WorkerError> {
        let mut wrote_scene = false;

        for (index, scene) in scenes.iter().enumerate() {
            let settled = self.chapter_repo.settled_scenes(chapter_id).await?;
            if settled.contains(&index) {
                self.adopt_settled(project_id, chapter_id, index, owner)
                    .await?;
                continue;
            }

            if wrote_scene {
                self.pace(self.config.scene_delay).await;
            }
            if let Some(stop) = self.checkpoint(project_id).await? {
                return Ok(Some(stop));
            }

            let mut held = match self
                .claim_unit(chapter_id, JobType::WriteScene, Some(index), owner)
                .await?
            {
                // 后续场景依赖这个场景的正文，整章交给持有者
                UnitClaim::Busy => {
                    tracing::debug!(chapter_id = %chapter_id, scene_index = index, "Scene held by another worker, leaving chapter");
                    return Ok(None);
                }
                UnitClaim::Settled(JobStatus::Failed) => {
                    self.accumulator.skip_scene(chapter_id, index).await?;
                    continue;
                }
                UnitClaim::Settled(_) => continue,
                UnitClaim::Held(job) => Some(job),
                UnitClaim::Unqueued => None,
            };
            wrote_scene = true;

            let project = self.load_project(project_id).await?;
            let chapter = self.load_chapter(chapter_id).await?;
            self.chapter_repo
                .transition_status(
                    chapter_id,
                    &[
                        ChapterStatus::Pending,
                        ChapterStatus::GeneratingOutline,
                        ChapterStatus::OutlineReady,
                    ],
                    ChapterStatus::Writing,
                )
                .await?;

            let request = scene_request(&project, &chapter, position, scene);
            let request = &request;
            let attempt = self
                .with_retry(project_id, self.config.scene_attempts, &mut held, owner, || {
                    self.generator.write_scene(request)
                })
                .await?;

            match attempt {
                Attempt::Done(draft) => {
                    let appended = self
                        .accumulator
                        .append_scene(
                            chapter_id,
                            index,
                            &scene_fragment(index, &draft.text),
                            draft.word_count,
                        )
                        .await?;
                    let counted = match held {
                        Some(job) => self.lease_store.complete(job.id, owner).await?,
                        None => appended,
                    };
                    if counted {
                        self.project_repo
                            .increment_scene_counters(project_id, 1, 0)
                            .await?;
                    }

                    tracing::info!(
                        project_id = %project_id,
                        chapter_id = %chapter_id,
                        scene_index = index,
                        word_count = draft.word_count,
                        "Scene written"
                    );
                }
                Attempt::Exhausted(error) => {
                    let counted = match held {
                        Some(job) => matches!(
                            self.lease_store
                                .fail(job.id, owner, &error.to_string(), RetryDecision::GiveUp)
                                .await?,
                            FailOutcome::Exhausted { .. }
                        ),
                        None => true,
                    };
                    if counted {
                        self.project_repo
                            .increment_scene_counters(project_id, 0, 1)
                            .await?;
                        self.accumulator.skip_scene(chapter_id, index).await?;
                    }

                    tracing::error!(
                        project_id = %project_id,
                        chapter_id = %chapter_id,
                        scene_index = index,
                        error = %error,
                        "Scene generation exhausted, skipping"
                    );
                }
                Attempt::Interrupted(stop) => {
                    self.release(held, owner).await?;
                    return Ok(Some(stop));
                }
                Attempt::Yielded => {
                    tracing::debug!(chapter_id = %chapter_id, scene_index = index, "Scene taken over during backoff, leaving chapter");
                    return Ok(None);
                }
            }

            self.aggregator.settle(project_id).await?;
        }

        let chapter = self.load_chapter(chapter_id).await?;
        self.close_chapter(&chapter, position).await?;
        Ok(None)
    }

    /// 正文已结算但任务仍在队列（持有者在结算前崩溃）：接管并完成它
    async fn adopt_settled(
        &self,
        project_id: Uuid,
        chapter_id: Uuid,
        index: usize,
        owner: &str,
    ) -> Result<(), WorkerError> {
        let UnitClaim::Held(job) = self
            .claim_unit(chapter_id, JobType::WriteScene, Some(index), owner)
            .await?
        else {
            return Ok(());
        };
        if self.lease_store.complete(job.id, owner).await? {
            self.project_repo
                .increment_scene_counters(project_id, 1, 0)
                .await?;
            tracing::info!(job_id = %job.id, scene_index = index, "Scene already written, settled");
        }
        Ok(())
    }

    async fn close_chapter(&self, chapter: &ChapterRecord, position: usize) -> Result<(), WorkerError> {
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
}
