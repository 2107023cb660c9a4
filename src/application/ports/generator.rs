//! Generator Port - 生成式文本服务抽象
//!
//! 两类无状态调用：章节场景大纲生成、单场景正文生成。
//! 具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

use crate::domain::outline::SceneDescriptor;
use crate::domain::scheduling::FailureClass;

/// 生成错误
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Rate limited by generation service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Generation service unavailable: {0}")]
    Unavailable(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Service error: {0}")]
    ServiceError(String),
}

impl GeneratorError {
    /// 失败分类：限流与上游不可用属于背压，其余都按普通失败计入预算
    pub fn failure_class(&self) -> FailureClass {
        match self {
            GeneratorError::RateLimited { .. } | GeneratorError::Unavailable(_) => {
                FailureClass::Backpressure
            }
            _ => FailureClass::Transient,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GeneratorError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// 大纲生成请求
#[derive(Debug, Clone)]
pub struct OutlineRequest {
    pub project_title: String,
    pub genre: String,
    pub chapter_number: usize,
    pub chapter_title: String,
    pub chapter_summary: String,
    pub target_words: u32,
}

/// 场景正文生成请求
#[derive(Debug, Clone)]
pub struct SceneRequest {
    pub project_title: String,
    pub genre: String,
    pub chapter_number: usize,
    pub chapter_title: String,
    pub scene: SceneDescriptor,
    /// 章节已有正文的末尾，用于衔接
    pub previous_text: String,
}

/// 场景正文
#[derive(Debug, Clone)]
pub struct SceneDraft {
    pub text: String,
    pub word_count: u64,
}

/// Generator Port
#[async_trait]
pub trait GeneratorPort: Send + Sync {
    /// 生成章节场景大纲，返回按叙事顺序排列的场景描述
    async fn generate_outline(
        &self,
        request: &OutlineRequest,
    ) -> Result<Vec<SceneDescriptor>, GeneratorError>;

    /// 生成单个场景正文
    async fn write_scene(&self, request: &SceneRequest) -> Result<SceneDraft, GeneratorError>;
}
