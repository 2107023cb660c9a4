//! 项目完成判定
//!
//! 完成 = 没有活跃任务 且 所有场景已结算 且 字数达到目标的 70%。
//! 工作耗尽但字数不足时判定为 incomplete，而不是当作成功隐藏。

/// 完成阈值：目标字数的 70%（用整数比例避免浮点误差）
const THRESHOLD_NUMERATOR: u64 = 7;
const THRESHOLD_DENOMINATOR: u64 = 10;

/// 判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionVerdict {
    /// 仍有工作
    InProgress,
    /// 完成
    Completed,
    /// 工作耗尽但字数不足
    Incomplete,
}

/// 项目进度快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total_scenes: u64,
    pub completed_scenes: u64,
    pub failed_scenes: u64,
    /// pending / processing / paused 任务数
    pub active_jobs: u64,
    /// 还没有大纲的章节数
    pub chapters_without_outline: u64,
    pub word_count: u64,
    pub target_word_count: u64,
}

/// 字数是否达到完成阈值
pub fn meets_word_threshold(word_count: u64, target_word_count: u64) -> bool {
    word_count.saturating_mul(THRESHOLD_DENOMINATOR)
        >= target_word_count.saturating_mul(THRESHOLD_NUMERATOR)
}

impl ProgressSnapshot {
    /// 是否所有工作都已结算
    pub fn is_settled(&self) -> bool {
        self.active_jobs == 0
            && self.chapters_without_outline == 0
            && self.completed_scenes + self.failed_scenes >= self.total_scenes
    }

    pub fn verdict(&self) -> CompletionVerdict {
        if !self.is_settled() {
            return CompletionVerdict::InProgress;
        }
        if meets_word_threshold(self.word_count, self.target_word_count) {
            CompletionVerdict::Completed
        } else {
            CompletionVerdict::Incomplete
        }
    }
}
