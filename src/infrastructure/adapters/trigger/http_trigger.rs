//! HTTP Trigger - 通过 HTTP 自调用 worker tick 端点
//!
//! 请求在独立任务中发送，不等待响应，调用方的生命周期结束不影响触发

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::application::ports::{SelfTriggerPort, TriggerError, TriggerRequest};

/// Tick 请求体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickRequest {
    #[serde(default)]
    pub project_id: Option<Uuid>,
}

/// HTTP Trigger 配置
#[derive(Debug, Clone)]
pub struct HttpTriggerConfig {
    /// 例如 http://127.0.0.1:8080
    pub base_url: String,
    pub timeout_secs: u64,
}

/// HTTP Trigger
pub struct HttpTrigger {
    client: Client,
    url: String,
}

impl HttpTrigger {
    pub fn new(config: HttpTriggerConfig) -> Result<Self, TriggerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TriggerError::Failed(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/api/worker/tick", config.base_url.trim_end_matches('/')),
        })
    }
}

impl SelfTriggerPort for HttpTrigger {
    fn fire(&self, request: TriggerRequest) -> Result<(), TriggerError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TriggerError::Failed(e.to_string()))?;
        let client = self.client.clone();
        let url = self.url.clone();

        runtime.spawn(async move {
            if let Some(delay) = request.delay {
                tokio::time::sleep(delay).await;
            }
            let body = TickRequest {
                project_id: request.project_id,
            };
            match client.post(&url).json(&body).send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(url = %url, status = %response.status(), "Worker tick rejected");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Worker tick request failed");
                }
            }
        });

        Ok(())
    }
}
