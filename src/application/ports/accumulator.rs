//! Content Accumulator Port - 章节正文原子累加
//!
//! 合并规则：按提交顺序纯拼接。
//! 必须是存储端的单次原子读改写，不允许应用层“读出-拼接-写回”
//!
//! 场景级写入同时登记该场景的结算记录，正文与记录要么一起落盘要么都不落盘，
//! 重做检测只看结算记录

use async_trait::async_trait;
use uuid::Uuid;

use super::RepositoryError;

/// Content Accumulator Port
#[async_trait]
pub trait ContentAccumulatorPort: Send + Sync {
    /// 原子追加正文并累加字数
    async fn append(
        &self,
        chapter_id: Uuid,
        new_text: &str,
        word_delta: u64,
    ) -> Result<(), RepositoryError>;

    /// 追加一个场景的正文并登记为已写入，同时推进 current_scene_index
    ///
    /// 场景已结算过时不做任何修改并返回 false
    async fn append_scene(
        &self,
        chapter_id: Uuid,
        scene_index: usize,
        new_text: &str,
        word_delta: u64,
    ) -> Result<bool, RepositoryError>;

    /// 把预算耗尽的场景登记为已跳过并推进 current_scene_index，已结算时返回 false
    async fn skip_scene(&self, chapter_id: Uuid, scene_index: usize)
        -> Result<bool, RepositoryError>;
}
