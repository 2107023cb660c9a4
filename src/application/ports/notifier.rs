//! Notifier Port - 项目完成通知
//!
//! 即发即弃：通知失败只记录日志，不回滚编排状态

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// 通知错误
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),
}

/// 项目完成通知内容
#[derive(Debug, Clone, Serialize)]
pub struct ProjectCompletedNotice {
    pub project_id: Uuid,
    pub title: String,
    pub word_count: u64,
    pub completed_scenes: u64,
    pub failed_scenes: u64,
}

/// Notifier Port
#[async_trait]
pub trait NotifierPort: Send + Sync {
    /// 项目首次进入 completed 时调用（至少一次投递，幂等由接收方负责）
    async fn notify_completed(&self, notice: &ProjectCompletedNotice) -> Result<(), NotifyError>;
}
