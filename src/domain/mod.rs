//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - Outline Context: 场景大纲
//! - Scheduling Context: 重试、排序与完成判定

pub mod outline;
pub mod scheduling;

// 共享的正文工具
mod prose;

pub use prose::{context_tail, count_words, scene_fragment, DEFAULT_CONTEXT_CHARS, SCENE_SEPARATOR};
