//! Webhook Notifier - 以 JSON POST 投递完成通知
//!
//! Request: {"event": "project.completed", "project": {...}}

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::application::ports::{NotifierPort, NotifyError, ProjectCompletedNotice};

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    project: &'a ProjectCompletedNotice,
}

/// Webhook 配置
#[derive(Debug, Clone)]
pub struct WebhookNotifierConfig {
    pub url: String,
    pub timeout_secs: u64,
}

/// Webhook Notifier
pub struct WebhookNotifier {
    client: Client,
    config: WebhookNotifierConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookNotifierConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl NotifierPort for WebhookNotifier {
    async fn notify_completed(&self, notice: &ProjectCompletedNotice) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            event: "project.completed",
            project: notice,
        };

        let response = self
            .client
            .post(&self.config.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::DeliveryFailed(format!("HTTP {}", status)));
        }

        tracing::info!(
            project_id = %notice.project_id,
            url = %self.config.url,
            "Completion webhook delivered"
        );
        Ok(())
    }
}
