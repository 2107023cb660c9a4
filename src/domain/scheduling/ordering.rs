//! 任务排序规则
//!
//! 所有任务来自同一个扁平任务池，排序提示保证章节按叙事顺序推进:
//! - 大纲任务: priority 高，sort_order = 章节位置
//! - 场景任务: sort_order = 章节位置 * 100 + 场景索引

/// 大纲任务优先级（先完成全部大纲再写正文）
pub const OUTLINE_PRIORITY: i64 = 10;

/// 场景任务优先级
pub const SCENE_PRIORITY: i64 = 5;

/// 每个章节在 sort_order 中占用的槽位数
pub const CHAPTER_SLOT: i64 = 100;

pub fn outline_sort_order(chapter_position: i64) -> i64 {
    chapter_position
}

pub fn scene_sort_order(chapter_position: i64, scene_index: i64) -> i64 {
    chapter_position * CHAPTER_SLOT + scene_index
}
