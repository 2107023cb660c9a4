//! Tick Dispatcher - 本地自触发的消费端
//!
//! 从通道接收触发请求，每个请求派生一次独立的工作者调用，
//! 用信号量限制同时进行的调用数

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use super::{InvocationOutcome, LeasedWorker};
use crate::application::ports::LeaseFilter;
use crate::infrastructure::adapters::Tick;

/// Dispatcher 配置
#[derive(Debug, Clone)]
pub struct TickDispatcherConfig {
    /// 最大并发调用数
    pub max_concurrent: usize,
}

impl Default for TickDispatcherConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

/// Tick Dispatcher
pub struct TickDispatcher {
    config: TickDispatcherConfig,
    receiver: mpsc::Receiver<Tick>,
    worker: Arc<LeasedWorker>,
}

impl TickDispatcher {
    pub fn new(
        config: TickDispatcherConfig,
        receiver: mpsc::Receiver<Tick>,
        worker: Arc<LeasedWorker>,
    ) -> Self {
        Self {
            config,
            receiver,
            worker,
        }
    }

    /// 运行直到通道关闭
    pub async fn run(mut self) {
        tracing::info!(
            max_concurrent = self.config.max_concurrent,
            "TickDispatcher started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));

        while let Some(project_id) = self.receiver.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!("Failed to acquire semaphore permit");
                    break;
                }
            };

            let worker = self.worker.clone();
            tokio::spawn(async move {
                let _permit = permit; // 持有 permit 直到调用结束

                let filter = LeaseFilter {
                    project_id,
                    job_type: None,
                };
                match worker.run_once(filter).await {
                    Ok(InvocationOutcome::Executed {
                        job_id, result, ..
                    }) => {
                        tracing::debug!(job_id = %job_id, result = ?result, "Invocation finished");
                    }
                    Ok(outcome) => {
                        tracing::trace!(outcome = ?outcome, "Nothing to lease");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Worker invocation failed");
                    }
                }
            });
        }

        tracing::info!("TickDispatcher stopped");
    }
}
