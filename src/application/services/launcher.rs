//! Leased Launcher - 拉取式驱动的启动
//!
//! 补齐任务、立即汇总一次（没有任何章节的项目在这里直接结算），
//! 然后自触发一次工作者调用

use std::sync::Arc;
use uuid::Uuid;

use super::{JobPlanner, ProgressAggregator};
use crate::application::error::ApplicationError;
use crate::application::ports::{SelfTriggerPort, TriggerRequest};

/// Leased Launcher
pub struct LeasedLauncher {
    planner: Arc<JobPlanner>,
    aggregator: Arc<ProgressAggregator>,
    trigger: Arc<dyn SelfTriggerPort>,
}

impl LeasedLauncher {
    pub fn new(
        planner: Arc<JobPlanner>,
        aggregator: Arc<ProgressAggregator>,
        trigger: Arc<dyn SelfTriggerPort>,
    ) -> Self {
        Self {
            planner,
            aggregator,
            trigger,
        }
    }

    /// 返回新建任务数量
    pub async fn launch(&self, project_id: Uuid) -> Result<usize, ApplicationError> {
        let created = self.planner.plan(project_id).await?;
        let outcome = self.aggregator.settle(project_id).await?;

        if outcome.has_remaining_work() {
            // 触发失败不影响启动结果，周期清扫会补上
            if let Err(e) = self.trigger.fire(TriggerRequest::now(Some(project_id))) {
                tracing::warn!(project_id = %project_id, error = %e, "Failed to fire worker trigger");
            }
        }

        Ok(created)
    }
}
