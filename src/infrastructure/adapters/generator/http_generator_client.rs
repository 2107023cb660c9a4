//! HTTP Generator Client - 调用外部生成式文本服务
//!
//! 实现 GeneratorPort trait，使用 OpenAI 兼容的 chat completions 接口
//!
//! 外部 API:
//! POST {base_url}/v1/chat/completions
//! Request: {"model": "...", "messages": [{"role": "system", ...}, {"role": "user", ...}]}
//! Response: {"choices": [{"message": {"content": "..."}}]}
//!
//! 状态码映射:
//! - 429 → RateLimited（读取 Retry-After 秒数）
//! - 502 / 503 / 504 → Unavailable
//! - 其它非 2xx → ServiceError

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::prompts::{outline_prompt, scene_prompt, OUTLINE_SYSTEM, SCENE_SYSTEM};
use crate::application::ports::{
    GeneratorError, GeneratorPort, OutlineRequest, SceneDraft, SceneRequest,
};
use crate::domain::count_words;
use crate::domain::outline::{parse_scene_outline, SceneDescriptor};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP Generator 客户端配置
#[derive(Debug, Clone)]
pub struct HttpGeneratorClientConfig {
    /// 生成服务基础 URL
    pub base_url: String,
    /// API Key（Bearer）
    pub api_key: Option<String>,
    /// 模型名
    pub model: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpGeneratorClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_key: None,
            model: "default".to_string(),
            timeout_secs: 180,
        }
    }
}

impl HttpGeneratorClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP Generator 客户端
pub struct HttpGeneratorClient {
    client: Client,
    config: HttpGeneratorClientConfig,
}

impl HttpGeneratorClient {
    /// 创建新的 HTTP Generator 客户端
    pub fn new(config: HttpGeneratorClientConfig) -> Result<Self, GeneratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GeneratorError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// 发送一次对话请求，返回模型输出文本
    async fn complete(&self, system: &str, user: &str) -> Result<String, GeneratorError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let mut request = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GeneratorError::Timeout
            } else if e.is_connect() {
                GeneratorError::NetworkError(format!("Cannot connect to generation service: {}", e))
            } else {
                GeneratorError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &error_text));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GeneratorError::Timeout
            } else {
                GeneratorError::InvalidResponse(e.to_string())
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| GeneratorError::InvalidResponse("empty completion".to_string()))
    }
}

/// 解析 Retry-After（只支持秒数形式）
fn parse_retry_after(headers: &HeaderMap) -> Option<ChronoDuration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|secs| *secs >= 0)
        .map(ChronoDuration::seconds)
}

/// 非 2xx 状态码映射为生成错误
fn classify_status(
    status: StatusCode,
    retry_after: Option<ChronoDuration>,
    body: &str,
) -> GeneratorError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => GeneratorError::RateLimited { retry_after },
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            GeneratorError::Unavailable(format!("HTTP {}", status))
        }
        _ => GeneratorError::ServiceError(format!("HTTP {}: {}", status, body)),
    }
}

#[async_trait]
impl GeneratorPort for HttpGeneratorClient {
    async fn generate_outline(
        &self,
        request: &OutlineRequest,
    ) -> Result<Vec<SceneDescriptor>, GeneratorError> {
        tracing::debug!(
            url = %self.completions_url(),
            chapter = request.chapter_number,
            target_words = request.target_words,
            "Sending outline request"
        );

        let content = self.complete(OUTLINE_SYSTEM, &outline_prompt(request)).await?;
        let scenes = parse_scene_outline(&content, request.target_words)
            .map_err(|e| GeneratorError::InvalidResponse(e.to_string()))?;

        tracing::info!(
            chapter = request.chapter_number,
            scenes = scenes.len(),
            "Outline generated"
        );
        Ok(scenes)
    }

    async fn write_scene(&self, request: &SceneRequest) -> Result<SceneDraft, GeneratorError> {
        tracing::debug!(
            url = %self.completions_url(),
            chapter = request.chapter_number,
            scene = request.scene.scene_number,
            context_chars = request.previous_text.len(),
            "Sending scene request"
        );

        let text = self.complete(SCENE_SYSTEM, &scene_prompt(request)).await?;
        let word_count = count_words(&text);

        tracing::info!(
            chapter = request.chapter_number,
            scene = request.scene.scene_number,
            word_count = word_count,
            "Scene generated"
        );
        Ok(SceneDraft { text, word_count })
    }
}
