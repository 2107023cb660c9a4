//! Sweeper - 周期清扫
//!
//! 回收过期租约并补发一次自触发，弥补丢失的触发和退避结束后的空档

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{LeaseStorePort, SelfTriggerPort, TriggerRequest};

/// Sweeper 配置
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub lease_timeout: chrono::Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            lease_timeout: chrono::Duration::minutes(5),
        }
    }
}

/// Sweeper
pub struct Sweeper {
    config: SweeperConfig,
    lease_store: Arc<dyn LeaseStorePort>,
    trigger: Arc<dyn SelfTriggerPort>,
}

impl Sweeper {
    pub fn new(
        config: SweeperConfig,
        lease_store: Arc<dyn LeaseStorePort>,
        trigger: Arc<dyn SelfTriggerPort>,
    ) -> Self {
        Self {
            config,
            lease_store,
            trigger,
        }
    }

    /// 执行一次清扫，返回回收的租约数
    pub async fn sweep_once(&self) -> u64 {
        let reclaimed = match self
            .lease_store
            .reclaim_stale_leases(self.config.lease_timeout)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "Failed to reclaim stale leases");
                0
            }
        };

        if reclaimed > 0 {
            tracing::warn!(reclaimed = reclaimed, "Stale leases reclaimed");
        }

        if let Err(e) = self.trigger.fire(TriggerRequest::now(None)) {
            tracing::warn!(error = %e, "Sweeper failed to fire worker trigger");
        }

        reclaimed
    }

    /// 按间隔无限循环
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            "Sweeper started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }
}
