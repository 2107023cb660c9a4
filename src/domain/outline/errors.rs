//! Outline Context - Errors

use thiserror::Error;

/// 大纲解析错误
///
/// 生成服务返回无法解析的大纲时产生，按可重试的普通失败处理
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutlineParseError {
    #[error("outline response is empty")]
    Empty,

    #[error("outline response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("outline contains no scenes")]
    NoScenes,

    #[error("scene {index} is missing a title")]
    MissingTitle { index: usize },
}
