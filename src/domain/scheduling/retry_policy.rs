//! Retry Policy - 失败分类与退避计算
//!
//! 两类失败必须区分处理:
//! - 背压（限流 / 上游不可用）: 长抖动延迟重试，不消耗尝试预算
//! - 其它失败（网络、超时、输出无法解析）: 消耗预算，指数退避，预算耗尽即终止

use chrono::Duration;
use std::sync::Arc;

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 外部背压：限流或上游暂不可用
    Backpressure,
    /// 普通可重试失败：网络、超时、格式错误
    Transient,
}

/// 重试决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 延迟后重试
    Retry {
        delay: Duration,
        /// 是否计入尝试次数
        consume_attempt: bool,
    },
    /// 预算耗尽，终止
    GiveUp,
}

impl RetryDecision {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryDecision::GiveUp)
    }
}

/// 重试策略参数
#[derive(Debug, Clone)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub rate_limit_min: Duration,
    pub rate_limit_max: Duration,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            backoff_base: Duration::seconds(10),
            backoff_cap: Duration::minutes(5),
            rate_limit_min: Duration::seconds(60),
            rate_limit_max: Duration::seconds(120),
        }
    }
}

/// 抖动来源
pub trait JitterSource: Send + Sync {
    /// 在 `[min, max]` 闭区间内取一个秒数
    fn pick_secs(&self, min: i64, max: i64) -> i64;
}

/// 基于线程本地随机数的抖动
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn pick_secs(&self, min: i64, max: i64) -> i64 {
        use rand::Rng;
        if min >= max {
            return min;
        }
        rand::rng().random_range(min..=max)
    }
}

/// 重试策略
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryPolicyConfig,
    jitter: Arc<dyn JitterSource>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryPolicyConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryPolicyConfig) -> Self {
        Self::with_jitter(config, Arc::new(ThreadRngJitter))
    }

    pub fn with_jitter(config: RetryPolicyConfig, jitter: Arc<dyn JitterSource>) -> Self {
        Self { config, jitter }
    }

    /// 复制一份仅预算不同的策略（顺序驱动器的有界重试循环使用）
    pub fn with_max_attempts(&self, max_attempts: u32) -> Self {
        let mut config = self.config.clone();
        config.max_attempts = max_attempts;
        Self {
            config,
            jitter: self.jitter.clone(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// 计算第 `attempt` 次（从 1 开始）失败后的退避时间
    ///
    /// base * 2^(attempt-1)，封顶 backoff_cap
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let base_secs = self.config.backoff_base.num_seconds().max(0);
        let secs = base_secs.saturating_mul(1_i64 << exponent);
        Duration::seconds(secs.min(self.config.backoff_cap.num_seconds()))
    }

    /// 背压延迟：在 [rate_limit_min, rate_limit_max] 内抖动，服务端建议更久时取建议值
    pub fn backpressure_delay(&self, retry_after: Option<Duration>) -> Duration {
        let jittered = Duration::seconds(self.jitter.pick_secs(
            self.config.rate_limit_min.num_seconds(),
            self.config.rate_limit_max.num_seconds(),
        ));
        match retry_after {
            Some(hint) if hint > jittered => hint,
            _ => jittered,
        }
    }

    /// 根据失败类别和已消耗的尝试次数给出决策
    ///
    /// # 参数
    /// - `class` - 失败类别
    /// - `attempts` - 本次失败之前已计入的尝试次数
    /// - `retry_after` - 服务端给出的建议等待时间（仅背压时参考）
    pub fn decide(
        &self,
        class: FailureClass,
        attempts: u32,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        match class {
            FailureClass::Backpressure => RetryDecision::Retry {
                delay: self.backpressure_delay(retry_after),
                consume_attempt: false,
            },
            FailureClass::Transient => {
                let next_attempt = attempts.saturating_add(1);
                if next_attempt >= self.config.max_attempts {
                    RetryDecision::GiveUp
                } else {
                    RetryDecision::Retry {
                        delay: self.backoff_for(next_attempt),
                        consume_attempt: true,
                    }
                }
            }
        }
    }
}
