//! Configuration Loader
//!
//! 分层合并：内置默认值 < config.toml < config.local.toml < `LONGFORM_*` 环境变量

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, DriverKind, GeneratorKind, TriggerKind};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 未指定路径时依次尝试的配置文件（均可缺省）
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

const ENV_PREFIX: &str = "LONGFORM";

/// 加载应用配置
///
/// 嵌套键用双下划线，例如：
/// - `LONGFORM_SERVER__PORT=9000`
/// - `LONGFORM_GENERATOR__KIND=fake`
/// - `LONGFORM_ORCHESTRATOR__DRIVER=sequential`
/// - `LONGFORM_WORKER__MAX_ATTEMPTS=20`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定文件加载；`None` 时按 [`CONFIG_FILE_NAMES`] 搜索当前目录
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let app_config: AppConfig = layered_sources(config_path)?
        .build()?
        .try_deserialize()
        .map_err(|e| ConfigError::ParseError(format!("Failed to deserialize config: {}", e)))?;

    validate_config(&app_config)?;
    Ok(app_config)
}

fn layered_sources(
    config_path: Option<&Path>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    // 其余字段的默认值由 serde default 提供
    let mut builder = Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("database.path", "data/longform.db")?
        .set_default("generator.kind", "http")?
        .set_default("orchestrator.driver", "leased")?
        .set_default("worker.trigger", "local")?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    builder = match config_path {
        Some(path) => builder.add_source(File::from(path).required(true)),
        None => CONFIG_FILE_NAMES.iter().fold(builder, |b, name| {
            b.add_source(File::with_name(name).required(false))
        }),
    };

    Ok(builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    ))
}

/// 拒绝会让调度器无法工作的取值
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let worker = &config.worker;
    let rules = [
        (config.server.port == 0, "server.port cannot be 0".to_string()),
        (config.database.path.is_empty(), "database.path cannot be empty".to_string()),
        (
            config.generator.kind == GeneratorKind::Http && config.generator.url.is_empty(),
            "generator.url is required when generator.kind = http".to_string(),
        ),
        (worker.max_attempts == 0, "worker.max_attempts must be at least 1".to_string()),
        (worker.backoff_base_secs == 0, "worker.backoff_base_secs cannot be 0".to_string()),
        (
            worker.rate_limit_min_secs > worker.rate_limit_max_secs,
            format!(
                "worker.rate_limit_min_secs ({}) exceeds rate_limit_max_secs ({})",
                worker.rate_limit_min_secs, worker.rate_limit_max_secs
            ),
        ),
        (worker.max_concurrent == 0, "worker.max_concurrent cannot be 0".to_string()),
    ];

    match rules.into_iter().find(|(violated, _)| *violated) {
        Some((_, message)) => Err(ConfigError::ValidationError(message)),
        None => Ok(()),
    }
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);
    tracing::info!("Public Base URL: {}", config.server.public_base_url());
    tracing::info!("Database: {}", config.database.path);
    tracing::info!("Database Max Connections: {}", config.database.max_connections);
    tracing::info!("Generator: {:?} ({})", config.generator.kind, config.generator.url);
    tracing::info!("Generator Model: {}", config.generator.model);
    tracing::info!("Generator Timeout: {}s", config.generator.timeout_secs);
    tracing::info!("Driver: {}", config.orchestrator.driver.as_str());
    match config.orchestrator.driver {
        DriverKind::Leased => {
            let worker = &config.worker;
            tracing::info!(
                "Worker: max_attempts={} backoff={}s..{}s rate_limit={}s..{}s",
                worker.max_attempts,
                worker.backoff_base_secs,
                worker.backoff_cap_secs,
                worker.rate_limit_min_secs,
                worker.rate_limit_max_secs
            );
            tracing::info!(
                "Lease Timeout: {}s, Serialize Chapters: {}",
                worker.lease_timeout_secs,
                worker.serialize_chapters
            );
            let trigger = match worker.trigger {
                TriggerKind::Local => "local",
                TriggerKind::Http => "http",
            };
            tracing::info!(
                "Trigger: {}, Max Concurrent: {}, Sweep Interval: {}s",
                trigger,
                worker.max_concurrent,
                worker.sweep_interval_secs
            );
        }
        DriverKind::Sequential => {
            let seq = &config.sequential;
            tracing::info!(
                "Sequential: scene_delay={}s chapter_delay={}s attempts={}/{}",
                seq.scene_delay_secs,
                seq.chapter_delay_secs,
                seq.outline_attempts,
                seq.scene_attempts
            );
        }
    }
    match &config.notifier.webhook_url {
        Some(url) => tracing::info!("Notifier: webhook {}", url),
        None => tracing::info!("Notifier: log"),
    }
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}
