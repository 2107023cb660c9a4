//! Clock Port - 时间来源抽象
//!
//! 租约时间、重试时间都从这里取，测试中注入可手动推进的时钟

use chrono::{DateTime, Utc};

/// 时间来源
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
