//! Scheduling Context - 调度规则
//!
//! 职责:
//! - 失败分类与重试退避
//! - 任务优先级与排序
//! - 项目完成判定

mod completion;
mod ordering;
mod retry_policy;

pub use completion::{meets_word_threshold, CompletionVerdict, ProgressSnapshot};
pub use ordering::{
    outline_sort_order, scene_sort_order, CHAPTER_SLOT, OUTLINE_PRIORITY, SCENE_PRIORITY,
};
pub use retry_policy::{
    FailureClass, JitterSource, RetryDecision, RetryPolicy, RetryPolicyConfig, ThreadRngJitter,
};
