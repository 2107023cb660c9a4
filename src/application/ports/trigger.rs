//! Self-Trigger Port - 工作者自触发
//!
//! 拉取式工作者每次调用只处理一个任务，剩余工作通过自触发继续。
//! 触发必须与当前调用的生命周期解耦，且不阻塞调用方

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// 触发错误
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Trigger channel closed")]
    Closed,

    #[error("Trigger queue full")]
    QueueFull,

    #[error("Trigger failed: {0}")]
    Failed(String),
}

/// 触发请求
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerRequest {
    /// 限定项目（None 表示任意项目）
    pub project_id: Option<Uuid>,
    /// 延迟触发（所有剩余任务都在退避中时使用）
    pub delay: Option<Duration>,
}

impl TriggerRequest {
    pub fn now(project_id: Option<Uuid>) -> Self {
        Self {
            project_id,
            delay: None,
        }
    }

    pub fn after(project_id: Option<Uuid>, delay: Duration) -> Self {
        Self {
            project_id,
            delay: Some(delay),
        }
    }
}

/// Self-Trigger Port
pub trait SelfTriggerPort: Send + Sync {
    /// 请求另一次工作者调用，立即返回
    fn fire(&self, request: TriggerRequest) -> Result<(), TriggerError>;
}
