//! 测试辅助：手动时钟、脚本化生成器、记录型通知/触发，以及装配好的内存数据库环境

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::application::ports::{
    ChapterRecord, ChapterRepositoryPort, Clock, GeneratorError, GeneratorPort, NotifierPort,
    NotifyError, OutlineRequest, ProjectCompletedNotice, ProjectRecord, ProjectRepositoryPort,
    ProjectStatus, SceneDraft, SceneRequest, SelfTriggerPort, TriggerError, TriggerRequest,
};
use crate::application::services::{JobPlanner, LeasedLauncher, ProgressAggregator};
use crate::application::{
    GenerationControlResponse, PauseGeneration, PauseGenerationHandler, ResumeGeneration,
    ResumeGenerationHandler, StartGeneration, StartGenerationHandler,
};
use crate::domain::outline::SceneDescriptor;
use crate::domain::scheduling::{JitterSource, RetryPolicy, RetryPolicyConfig};
use crate::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, DbPool, LeaseStoreConfig,
    SqliteChapterRepository, SqliteLeaseStore, SqliteProjectRepository,
};
use crate::infrastructure::worker::{
    LeasedWorker, LeasedWorkerConfig, SequentialDriver, SequentialDriverConfig,
};

// ============================================================================
// Clock / Jitter
// ============================================================================

/// 手动推进的时钟，起点为整秒
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// 总是取区间下界
pub struct MinJitter;

impl JitterSource for MinJitter {
    fn pick_secs(&self, min: i64, _max: i64) -> i64 {
        min
    }
}

// ============================================================================
// Generator
// ============================================================================

struct PauseHook {
    after_scenes: usize,
    project_repo: Arc<dyn ProjectRepositoryPort>,
    project_id: Uuid,
}

/// 按脚本返回结果的生成器；脚本耗尽后返回默认结果
pub struct ScriptedGenerator {
    outlines: Mutex<VecDeque<Result<Vec<SceneDescriptor>, GeneratorError>>>,
    scenes: Mutex<VecDeque<Result<SceneDraft, GeneratorError>>>,
    default_outline: Mutex<Vec<SceneDescriptor>>,
    default_scene_words: AtomicU64,
    outline_calls: AtomicUsize,
    scene_calls: AtomicUsize,
    pause_hook: Mutex<Option<PauseHook>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self {
            outlines: Mutex::default(),
            scenes: Mutex::default(),
            default_outline: Mutex::new(vec![
                SceneDescriptor::new(1, "Opening", 300),
                SceneDescriptor::new(2, "Turn", 300),
            ]),
            default_scene_words: AtomicU64::new(100),
            outline_calls: AtomicUsize::new(0),
            scene_calls: AtomicUsize::new(0),
            pause_hook: Mutex::default(),
        }
    }
}

impl ScriptedGenerator {
    /// 指定字数的场景正文
    pub fn draft(words: u64) -> SceneDraft {
        let text = vec!["word"; words as usize].join(" ");
        SceneDraft {
            text,
            word_count: words,
        }
    }

    pub fn push_outline(&self, result: Result<Vec<SceneDescriptor>, GeneratorError>) {
        self.outlines.lock().unwrap().push_back(result);
    }

    pub fn push_scene(&self, result: Result<SceneDraft, GeneratorError>) {
        self.scenes.lock().unwrap().push_back(result);
    }

    pub fn set_default_outline(&self, scenes: Vec<SceneDescriptor>) {
        *self.default_outline.lock().unwrap() = scenes;
    }

    pub fn set_default_scene_words(&self, words: u64) {
        self.default_scene_words.store(words, Ordering::SeqCst);
    }

    /// 第 n 次场景调用返回前把项目置为暂停
    pub fn pause_after_scenes(
        &self,
        after_scenes: usize,
        project_repo: Arc<dyn ProjectRepositoryPort>,
        project_id: Uuid,
    ) {
        *self.pause_hook.lock().unwrap() = Some(PauseHook {
            after_scenes,
            project_repo,
            project_id,
        });
    }

    pub fn outline_calls(&self) -> usize {
        self.outline_calls.load(Ordering::SeqCst)
    }

    pub fn scene_calls(&self) -> usize {
        self.scene_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeneratorPort for ScriptedGenerator {
    async fn generate_outline(
        &self,
        _request: &OutlineRequest,
    ) -> Result<Vec<SceneDescriptor>, GeneratorError> {
        self.outline_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.outlines.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(self.default_outline.lock().unwrap().clone()),
        }
    }

    async fn write_scene(&self, _request: &SceneRequest) -> Result<SceneDraft, GeneratorError> {
        let calls = self.scene_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self.scenes.lock().unwrap().pop_front();
        let result = match scripted {
            Some(result) => result,
            None => Ok(Self::draft(self.default_scene_words.load(Ordering::SeqCst))),
        };

        let hook = self
            .pause_hook
            .lock()
            .unwrap()
            .as_ref()
            .filter(|hook| hook.after_scenes == calls)
            .map(|hook| (hook.project_repo.clone(), hook.project_id));
        if let Some((project_repo, project_id)) = hook {
            project_repo
                .transition_status(project_id, &ProjectStatus::ACTIVE, ProjectStatus::Paused, None)
                .await
                .unwrap();
        }

        result
    }
}

// ============================================================================
// Notifier / Trigger
// ============================================================================

/// 记录所有完成通知
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<ProjectCompletedNotice>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<ProjectCompletedNotice> {
        self.notices.lock().unwrap().clone()
    }

    /// 之后的投递都记录下来但返回失败
    pub fn fail_deliveries(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotifierPort for RecordingNotifier {
    async fn notify_completed(&self, notice: &ProjectCompletedNotice) -> Result<(), NotifyError> {
        self.notices.lock().unwrap().push(notice.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::DeliveryFailed("webhook down".into()));
        }
        Ok(())
    }
}

/// 记录所有触发请求
#[derive(Default)]
pub struct RecordingTrigger {
    requests: Mutex<Vec<TriggerRequest>>,
}

impl RecordingTrigger {
    pub fn requests(&self) -> Vec<TriggerRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl SelfTriggerPort for RecordingTrigger {
    fn fire(&self, request: TriggerRequest) -> Result<(), TriggerError> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// 内存数据库 + 测试替身装配
pub struct Harness {
    pub pool: DbPool,
    pub clock: Arc<ManualClock>,
    pub project_repo: Arc<SqliteProjectRepository>,
    pub chapter_repo: Arc<SqliteChapterRepository>,
    pub lease_store: Arc<SqliteLeaseStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub notifier: Arc<RecordingNotifier>,
    pub trigger: Arc<RecordingTrigger>,
    /// 默认参数、抖动取下界
    pub policy: RetryPolicy,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_lease_config(LeaseStoreConfig::default()).await
    }

    pub async fn with_lease_config(lease_config: LeaseStoreConfig) -> Self {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let clock = Arc::new(ManualClock::default());
        let lease_store = Arc::new(SqliteLeaseStore::new(pool.clone(), clock.clone(), lease_config));

        Self {
            project_repo: Arc::new(SqliteProjectRepository::new(pool.clone(), clock.clone())),
            chapter_repo: Arc::new(SqliteChapterRepository::new(pool.clone(), clock.clone())),
            lease_store,
            clock,
            generator: Arc::new(ScriptedGenerator::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            trigger: Arc::new(RecordingTrigger::default()),
            policy: RetryPolicy::with_jitter(RetryPolicyConfig::default(), Arc::new(MinJitter)),
            pool,
        }
    }

    /// 没有任何等待的策略，供会真正 sleep 的顺序驱动器使用
    pub fn instant_policy(&self) -> RetryPolicy {
        RetryPolicy::with_jitter(
            RetryPolicyConfig {
                max_attempts: 15,
                backoff_base: Duration::zero(),
                backoff_cap: Duration::zero(),
                rate_limit_min: Duration::zero(),
                rate_limit_max: Duration::zero(),
            },
            Arc::new(MinJitter),
        )
    }

    /// 创建 idle 项目及 n 个章节（sort_order 0..n）
    pub async fn seed_project(
        &self,
        target_word_count: u64,
        chapter_count: usize,
    ) -> (ProjectRecord, Vec<ChapterRecord>) {
        let project = ProjectRecord::new("The Lantern Keeper", "mystery", target_word_count);
        self.project_repo.save(&project).await.unwrap();

        let mut chapters = Vec::with_capacity(chapter_count);
        for i in 0..chapter_count {
            let chapter = ChapterRecord::new(
                project.id,
                i as i64,
                format!("Chapter {}", i + 1),
                format!("Events of chapter {}", i + 1),
            );
            self.chapter_repo.save(&chapter).await.unwrap();
            chapters.push(chapter);
        }

        (project, chapters)
    }

    pub fn planner(&self) -> Arc<JobPlanner> {
        Arc::new(JobPlanner::new(
            self.chapter_repo.clone(),
            self.lease_store.clone(),
            self.clock.clone(),
            self.policy.max_attempts(),
        ))
    }

    pub fn aggregator(&self) -> Arc<ProgressAggregator> {
        Arc::new(ProgressAggregator::new(
            self.project_repo.clone(),
            self.chapter_repo.clone(),
            self.lease_store.clone(),
            self.notifier.clone(),
        ))
    }

    fn launcher(&self, trigger: Arc<dyn SelfTriggerPort>) -> Arc<LeasedLauncher> {
        Arc::new(LeasedLauncher::new(
            self.planner(),
            self.aggregator(),
            trigger,
        ))
    }

    pub fn start_handler(&self, leased: bool) -> StartGenerationHandler {
        StartGenerationHandler::new(
            self.project_repo.clone(),
            self.chapter_repo.clone(),
            leased.then(|| self.launcher(self.trigger.clone())),
        )
    }

    pub fn resume_handler(&self, leased: bool) -> ResumeGenerationHandler {
        ResumeGenerationHandler::new(
            self.project_repo.clone(),
            self.chapter_repo.clone(),
            self.lease_store.clone(),
            leased.then(|| self.launcher(self.trigger.clone())),
        )
    }

    pub async fn start(&self, project_id: Uuid, leased: bool) -> GenerationControlResponse {
        self.start_handler(leased)
            .handle(StartGeneration { project_id })
            .await
            .unwrap()
    }

    pub async fn start_with_trigger(
        &self,
        project_id: Uuid,
        trigger: Arc<dyn SelfTriggerPort>,
    ) -> GenerationControlResponse {
        StartGenerationHandler::new(
            self.project_repo.clone(),
            self.chapter_repo.clone(),
            Some(self.launcher(trigger)),
        )
        .handle(StartGeneration { project_id })
        .await
        .unwrap()
    }

    pub async fn pause(&self, project_id: Uuid) -> GenerationControlResponse {
        PauseGenerationHandler::new(self.project_repo.clone(), self.lease_store.clone())
            .handle(PauseGeneration { project_id })
            .await
            .unwrap()
    }

    pub async fn resume(&self, project_id: Uuid, leased: bool) -> GenerationControlResponse {
        self.resume_handler(leased)
            .handle(ResumeGeneration { project_id })
            .await
            .unwrap()
    }

    pub fn worker(&self) -> LeasedWorker {
        self.worker_with_trigger(self.trigger.clone())
    }

    pub fn worker_with_trigger(&self, trigger: Arc<dyn SelfTriggerPort>) -> LeasedWorker {
        LeasedWorker::new(
            LeasedWorkerConfig::default(),
            self.project_repo.clone(),
            self.chapter_repo.clone(),
            self.chapter_repo.clone(),
            self.lease_store.clone(),
            self.generator.clone(),
            self.planner(),
            self.aggregator(),
            trigger,
            self.policy.clone(),
            self.clock.clone(),
        )
    }

    pub fn driver(&self) -> SequentialDriver {
        SequentialDriver::new(
            SequentialDriverConfig {
                scene_delay: std::time::Duration::ZERO,
                chapter_delay: std::time::Duration::ZERO,
                ..SequentialDriverConfig::default()
            },
            self.project_repo.clone(),
            self.chapter_repo.clone(),
            self.chapter_repo.clone(),
            self.lease_store.clone(),
            self.generator.clone(),
            self.aggregator(),
            self.instant_policy(),
            self.clock.clone(),
        )
    }
}
