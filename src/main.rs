//! Longform - 长篇小说生成编排服务
//!
//! 启动流程:
//! - 加载配置、初始化日志
//! - 打开 SQLite 并执行迁移
//! - 组装适配器、租约 Worker、顺序驱动器
//! - 启动触发分发、租约清扫与 HTTP 服务

use std::sync::Arc;
use std::time::Duration;

use longform::application::{
    Clock, GeneratorPort, JobPlanner, LeasedLauncher, NotifierPort, ProgressAggregator,
    SelfTriggerPort, SystemClock,
};
use longform::config::{
    load_config, print_config, AppConfig, DriverKind, GeneratorKind, TriggerKind,
};
use longform::domain::scheduling::RetryPolicy;
use longform::infrastructure::adapters::{
    local_trigger_channel, FakeGenerator, HttpGeneratorClient, HttpGeneratorClientConfig,
    HttpTrigger, HttpTriggerConfig, LogNotifier, WebhookNotifier, WebhookNotifierConfig,
};
use longform::infrastructure::http::{AppState, HttpServer};
use longform::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, LeaseStoreConfig, SqliteChapterRepository,
    SqliteLeaseStore, SqliteProjectRepository,
};
use longform::infrastructure::worker::{
    LeasedWorker, LeasedWorkerConfig, SequentialDriver, SequentialDriverConfig, Sweeper,
    SweeperConfig, TickDispatcher, TickDispatcherConfig,
};

/// 本地触发通道容量
const TRIGGER_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);

    tracing::info!("Longform - 长篇小说生成编排服务");
    print_config(&config);

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    // 初始化数据库
    let db_config = DatabaseConfig::new(&config.database.path)
        .with_max_connections(config.database.max_connections);
    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Repository 与任务表
    let project_repo = Arc::new(SqliteProjectRepository::new(pool.clone(), clock.clone()));
    let chapter_repo = Arc::new(SqliteChapterRepository::new(pool.clone(), clock.clone()));
    let lease_store = Arc::new(SqliteLeaseStore::new(
        pool.clone(),
        clock.clone(),
        LeaseStoreConfig {
            lease_timeout: config.worker.lease_timeout(),
            serialize_chapters: config.worker.serialize_chapters,
        },
    ));

    let generator = build_generator(&config)?;
    let notifier = build_notifier(&config)?;

    // 自触发：本地通道或 HTTP 回调
    let (trigger, tick_rx) = match config.worker.trigger {
        TriggerKind::Local => {
            let (trigger, rx) = local_trigger_channel(TRIGGER_CHANNEL_CAPACITY);
            let trigger: Arc<dyn SelfTriggerPort> = Arc::new(trigger);
            (trigger, Some(rx))
        }
        TriggerKind::Http => {
            let trigger = HttpTrigger::new(HttpTriggerConfig {
                base_url: config.server.public_base_url(),
                timeout_secs: 10,
            })?;
            let trigger: Arc<dyn SelfTriggerPort> = Arc::new(trigger);
            (trigger, None)
        }
    };

    let policy = RetryPolicy::new(config.worker.retry_policy());

    let planner = Arc::new(JobPlanner::new(
        chapter_repo.clone(),
        lease_store.clone(),
        clock.clone(),
        config.worker.max_attempts,
    ));
    let aggregator = Arc::new(ProgressAggregator::new(
        project_repo.clone(),
        chapter_repo.clone(),
        lease_store.clone(),
        notifier,
    ));

    let worker = Arc::new(LeasedWorker::new(
        LeasedWorkerConfig::default(),
        project_repo.clone(),
        chapter_repo.clone(),
        chapter_repo.clone(),
        lease_store.clone(),
        generator.clone(),
        planner.clone(),
        aggregator.clone(),
        trigger.clone(),
        policy.clone(),
        clock.clone(),
    ));

    if let Some(rx) = tick_rx {
        let dispatcher = TickDispatcher::new(
            TickDispatcherConfig {
                max_concurrent: config.worker.max_concurrent,
            },
            rx,
            worker.clone(),
        );
        tokio::spawn(dispatcher.run());
    }

    let (launcher, sequential) = match config.orchestrator.driver {
        DriverKind::Leased => {
            let sweeper = Sweeper::new(
                SweeperConfig {
                    interval: Duration::from_secs(config.worker.sweep_interval_secs.max(1)),
                    lease_timeout: config.worker.lease_timeout(),
                },
                lease_store.clone(),
                trigger.clone(),
            );
            tokio::spawn(sweeper.run());

            let launcher = Arc::new(LeasedLauncher::new(planner, aggregator, trigger));
            (Some(launcher), None)
        }
        DriverKind::Sequential => {
            let seq = &config.sequential;
            let driver = Arc::new(SequentialDriver::new(
                SequentialDriverConfig {
                    scene_delay: Duration::from_secs(seq.scene_delay_secs),
                    chapter_delay: Duration::from_secs(seq.chapter_delay_secs),
                    outline_attempts: seq.outline_attempts,
                    scene_attempts: seq.scene_attempts,
                    ..SequentialDriverConfig::default()
                },
                project_repo.clone(),
                chapter_repo.clone(),
                chapter_repo.clone(),
                lease_store.clone(),
                generator,
                aggregator,
                policy,
                clock,
            ));
            (None, Some(driver))
        }
    };

    let state = AppState::new(
        project_repo,
        chapter_repo,
        lease_store,
        launcher,
        worker,
        sequential,
    );
    let server = HttpServer::new(&config.server, state);

    server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
            tracing::info!("Received shutdown signal");
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// 初始化日志；`RUST_LOG` 优先于配置中的级别
fn init_tracing(config: &AppConfig) {
    let log_filter = format!(
        "{},longform={},tower_http=debug",
        config.log.level, config.log.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_generator(config: &AppConfig) -> anyhow::Result<Arc<dyn GeneratorPort>> {
    let generator: Arc<dyn GeneratorPort> = match config.generator.kind {
        GeneratorKind::Http => Arc::new(HttpGeneratorClient::new(HttpGeneratorClientConfig {
            base_url: config.generator.url.clone(),
            api_key: config.generator.api_key.clone(),
            model: config.generator.model.clone(),
            timeout_secs: config.generator.timeout_secs,
        })?),
        GeneratorKind::Fake => Arc::new(FakeGenerator::with_defaults()),
    };
    Ok(generator)
}

fn build_notifier(config: &AppConfig) -> anyhow::Result<Arc<dyn NotifierPort>> {
    let notifier: Arc<dyn NotifierPort> = match &config.notifier.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(WebhookNotifierConfig {
            url: url.clone(),
            timeout_secs: config.notifier.timeout_secs,
        })?),
        None => Arc::new(LogNotifier),
    };
    Ok(notifier)
}
