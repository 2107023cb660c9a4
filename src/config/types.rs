//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;

use crate::domain::scheduling::RetryPolicyConfig;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 生成服务配置
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// 编排驱动选择
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// 租约 Worker 配置
    #[serde(default)]
    pub worker: WorkerConfig,

    /// 顺序驱动配置
    #[serde(default)]
    pub sequential: SequentialConfig,

    /// 完成通知配置
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 公开访问的 Base URL（HTTP 自触发回调使用）
    /// 如果未设置，则使用 http://{host}:{port}
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 获取公开的 Base URL
    pub fn public_base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| {
            let host = if self.host == "0.0.0.0" {
                "localhost"
            } else {
                &self.host
            };
            format!("http://{}:{}", host, self.port)
        })
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/longform.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// 生成器实现
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// OpenAI 兼容的 chat completions 服务
    #[default]
    Http,
    /// 本地确定性生成器
    Fake,
}

/// 生成服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub kind: GeneratorKind,

    /// 生成服务基础 URL
    #[serde(default = "default_generator_url")]
    pub url: String,

    /// Bearer Token
    #[serde(default)]
    pub api_key: Option<String>,

    /// 模型名
    #[serde(default = "default_generator_model")]
    pub model: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,
}

fn default_generator_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_generator_model() -> String {
    "default".to_string()
}

fn default_generator_timeout() -> u64 {
    180
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            kind: GeneratorKind::default(),
            url: default_generator_url(),
            api_key: None,
            model: default_generator_model(),
            timeout_secs: default_generator_timeout(),
        }
    }
}

/// 编排驱动
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// 任务表 + 租约 + 自触发
    #[default]
    Leased,
    /// 单进程长循环
    Sequential,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Leased => "leased",
            DriverKind::Sequential => "sequential",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub driver: DriverKind,
}

/// 自触发方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// 进程内通道，由 TickDispatcher 消费
    #[default]
    Local,
    /// POST 到自身的 /api/worker/tick
    Http,
}

/// 租约 Worker 配置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// 租约超时（秒）
    #[serde(default = "default_lease_timeout")]
    pub lease_timeout_secs: u64,

    /// 单个任务的最大尝试次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// 指数退避基数（秒）
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,

    /// 指数退避上限（秒）
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,

    /// 限流等待下限（秒）
    #[serde(default = "default_rate_limit_min")]
    pub rate_limit_min_secs: u64,

    /// 限流等待上限（秒）
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max_secs: u64,

    /// 同一章节的场景任务串行领取
    #[serde(default = "default_serialize_chapters")]
    pub serialize_chapters: bool,

    /// 进程内并发执行的调用数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default)]
    pub trigger: TriggerKind,

    /// 巡检间隔（秒）
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_lease_timeout() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    15
}

fn default_backoff_base() -> u64 {
    10
}

fn default_backoff_cap() -> u64 {
    300
}

fn default_rate_limit_min() -> u64 {
    60
}

fn default_rate_limit_max() -> u64 {
    120
}

fn default_serialize_chapters() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    4
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            lease_timeout_secs: default_lease_timeout(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base(),
            backoff_cap_secs: default_backoff_cap(),
            rate_limit_min_secs: default_rate_limit_min(),
            rate_limit_max_secs: default_rate_limit_max(),
            serialize_chapters: default_serialize_chapters(),
            max_concurrent: default_max_concurrent(),
            trigger: TriggerKind::default(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl WorkerConfig {
    /// 转换为重试策略参数
    pub fn retry_policy(&self) -> RetryPolicyConfig {
        RetryPolicyConfig {
            max_attempts: self.max_attempts,
            backoff_base: secs(self.backoff_base_secs),
            backoff_cap: secs(self.backoff_cap_secs),
            rate_limit_min: secs(self.rate_limit_min_secs),
            rate_limit_max: secs(self.rate_limit_max_secs),
        }
    }

    pub fn lease_timeout(&self) -> chrono::Duration {
        secs(self.lease_timeout_secs)
    }
}

fn secs(value: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1000))
}

/// 顺序驱动配置
#[derive(Debug, Clone, Deserialize)]
pub struct SequentialConfig {
    /// 场景之间的间隔（秒）
    #[serde(default = "default_scene_delay")]
    pub scene_delay_secs: u64,

    /// 章节之间的间隔（秒）
    #[serde(default = "default_chapter_delay")]
    pub chapter_delay_secs: u64,

    #[serde(default = "default_sequential_attempts")]
    pub outline_attempts: u32,

    #[serde(default = "default_sequential_attempts")]
    pub scene_attempts: u32,
}

fn default_scene_delay() -> u64 {
    8
}

fn default_chapter_delay() -> u64 {
    15
}

fn default_sequential_attempts() -> u32 {
    3
}

impl Default for SequentialConfig {
    fn default() -> Self {
        Self {
            scene_delay_secs: default_scene_delay(),
            chapter_delay_secs: default_chapter_delay(),
            outline_attempts: default_sequential_attempts(),
            scene_attempts: default_sequential_attempts(),
        }
    }
}

/// 完成通知配置
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Webhook 地址，未设置时只写日志
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// 请求超时时间（秒）
    #[serde(default = "default_notifier_timeout")]
    pub timeout_secs: u64,
}

fn default_notifier_timeout() -> u64 {
    10
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_notifier_timeout(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, "data/longform.db");
        assert_eq!(config.orchestrator.driver, DriverKind::Leased);
        assert_eq!(config.worker.trigger, TriggerKind::Local);
        assert!(config.worker.serialize_chapters);
    }

    #[test]
    fn test_public_base_url() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "0.0.0.0:8080");
        assert_eq!(config.public_base_url(), "http://localhost:8080");

        let config = ServerConfig {
            base_url: Some("https://books.example.com".to_string()),
            ..ServerConfig::default()
        };
        assert_eq!(config.public_base_url(), "https://books.example.com");
    }

    #[test]
    fn test_worker_defaults_match_retry_policy() {
        let policy = WorkerConfig::default().retry_policy();
        let expected = RetryPolicyConfig::default();
        assert_eq!(policy.max_attempts, expected.max_attempts);
        assert_eq!(policy.backoff_base, expected.backoff_base);
        assert_eq!(policy.backoff_cap, expected.backoff_cap);
        assert_eq!(policy.rate_limit_min, expected.rate_limit_min);
        assert_eq!(policy.rate_limit_max, expected.rate_limit_max);
        assert_eq!(WorkerConfig::default().lease_timeout(), chrono::Duration::minutes(5));
    }

    #[test]
    fn test_kinds_deserialize_lowercase() {
        let driver: DriverKind = serde_json::from_str("\"sequential\"").unwrap();
        assert_eq!(driver, DriverKind::Sequential);
        let kind: GeneratorKind = serde_json::from_str("\"fake\"").unwrap();
        assert_eq!(kind, GeneratorKind::Fake);
        let trigger: TriggerKind = serde_json::from_str("\"http\"").unwrap();
        assert_eq!(trigger, TriggerKind::Http);
    }
}
