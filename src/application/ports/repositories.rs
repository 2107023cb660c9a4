//! Repository Ports - 出站端口
//!
//! 定义项目/章节持久化的抽象接口
//! 具体实现在 infrastructure 层（如 SQLite）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::outline::SceneDescriptor;

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// ============================================================================
// Project Repository
// ============================================================================

/// 项目写作状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectStatus {
    /// 未开始
    Idle,
    /// 正在生成章节大纲
    GeneratingOutlines,
    /// 正在写正文
    Writing,
    /// 已暂停
    Paused,
    /// 已完成
    Completed,
    /// 工作耗尽但字数不足
    Incomplete,
    /// 失败（含取消）
    Failed,
}

impl ProjectStatus {
    /// 编排器独占的活跃状态
    pub const ACTIVE: [ProjectStatus; 2] =
        [ProjectStatus::GeneratingOutlines, ProjectStatus::Writing];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Idle => "idle",
            ProjectStatus::GeneratingOutlines => "generating_outlines",
            ProjectStatus::Writing => "writing",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Incomplete => "incomplete",
            ProjectStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(ProjectStatus::Idle),
            "generating_outlines" => Some(ProjectStatus::GeneratingOutlines),
            "writing" => Some(ProjectStatus::Writing),
            "paused" => Some(ProjectStatus::Paused),
            "completed" => Some(ProjectStatus::Completed),
            "incomplete" => Some(ProjectStatus::Incomplete),
            "failed" => Some(ProjectStatus::Failed),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProjectStatus::Completed | ProjectStatus::Incomplete | ProjectStatus::Failed
        )
    }
}

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::Idle
    }
}

/// 项目实体（用于持久化）
#[derive(Debug, Clone)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub title: String,
    pub genre: String,
    pub writing_status: ProjectStatus,
    pub total_scenes: u64,
    pub completed_scenes: u64,
    pub failed_scenes: u64,
    pub word_count: u64,
    pub current_chapter_index: usize,
    pub target_word_count: u64,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    pub fn new(title: impl Into<String>, genre: impl Into<String>, target_word_count: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            genre: genre.into(),
            writing_status: ProjectStatus::Idle,
            total_scenes: 0,
            completed_scenes: 0,
            failed_scenes: 0,
            word_count: 0,
            current_chapter_index: 0,
            target_word_count,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Project Repository Port
#[async_trait]
pub trait ProjectRepositoryPort: Send + Sync {
    /// 保存项目（外部协作方创建项目时使用）
    async fn save(&self, project: &ProjectRecord) -> Result<(), RepositoryError>;

    /// 根据 ID 查找项目
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ProjectRecord>, RepositoryError>;

    /// 条件状态迁移（CAS）
    ///
    /// 仅当当前状态属于 `from` 时迁移到 `to`，返回是否由本次调用完成迁移。
    /// `reason` 写入 failure_reason（None 表示清空）
    async fn transition_status(
        &self,
        id: Uuid,
        from: &[ProjectStatus],
        to: ProjectStatus,
        reason: Option<&str>,
    ) -> Result<bool, RepositoryError>;

    /// 原子递增场景计数
    async fn increment_scene_counters(
        &self,
        id: Uuid,
        completed: u64,
        failed: u64,
    ) -> Result<(), RepositoryError>;

    /// 写入重新汇总的字数
    async fn update_word_count(&self, id: Uuid, word_count: u64) -> Result<(), RepositoryError>;

    /// 记录当前章节位置（只前进不后退）
    async fn advance_chapter_index(&self, id: Uuid, index: usize) -> Result<(), RepositoryError>;
}

// ============================================================================
// Chapter Repository
// ============================================================================

/// 章节写作状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChapterStatus {
    Pending,
    GeneratingOutline,
    OutlineReady,
    Writing,
    Completed,
    Failed,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterStatus::Pending => "pending",
            ChapterStatus::GeneratingOutline => "generating_outline",
            ChapterStatus::OutlineReady => "outline_ready",
            ChapterStatus::Writing => "writing",
            ChapterStatus::Completed => "completed",
            ChapterStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ChapterStatus::Pending),
            "generating_outline" => Some(ChapterStatus::GeneratingOutline),
            "outline_ready" => Some(ChapterStatus::OutlineReady),
            "writing" => Some(ChapterStatus::Writing),
            "completed" => Some(ChapterStatus::Completed),
            "failed" => Some(ChapterStatus::Failed),
            _ => None,
        }
    }
}

impl Default for ChapterStatus {
    fn default() -> Self {
        ChapterStatus::Pending
    }
}

/// 章节实体（用于持久化）
#[derive(Debug, Clone)]
pub struct ChapterRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub sort_order: i64,
    pub title: String,
    pub summary: String,
    pub target_word_count: Option<u64>,
    pub writing_status: ChapterStatus,
    pub scene_outline: Option<Vec<SceneDescriptor>>,
    pub current_scene_index: usize,
    pub content: String,
    pub word_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChapterRecord {
    pub fn new(
        project_id: Uuid,
        sort_order: i64,
        title: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            sort_order,
            title: title.into(),
            summary: summary.into(),
            target_word_count: None,
            writing_status: ChapterStatus::Pending,
            scene_outline: None,
            current_scene_index: 0,
            content: String::new(),
            word_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_outline(&self) -> bool {
        self.scene_outline.is_some()
    }

    pub fn scene_count(&self) -> usize {
        self.scene_outline.as_ref().map(Vec::len).unwrap_or(0)
    }
}

/// Chapter Repository Port
#[async_trait]
pub trait ChapterRepositoryPort: Send + Sync {
    /// 保存章节（外部协作方创建章节时使用）
    async fn save(&self, chapter: &ChapterRecord) -> Result<(), RepositoryError>;

    /// 根据 ID 查找章节
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ChapterRecord>, RepositoryError>;

    /// 获取项目的全部章节（按 sort_order）
    async fn find_by_project(&self, project_id: Uuid)
        -> Result<Vec<ChapterRecord>, RepositoryError>;

    /// 写入场景大纲
    ///
    /// 大纲一旦写入不可变：仅当 scene_outline 为空时生效，
    /// 同一事务内累加项目 total_scenes。返回是否由本次调用写入
    async fn store_scene_outline(
        &self,
        chapter_id: Uuid,
        scenes: &[SceneDescriptor],
    ) -> Result<bool, RepositoryError>;

    /// 条件状态迁移（CAS）
    async fn transition_status(
        &self,
        chapter_id: Uuid,
        from: &[ChapterStatus],
        to: ChapterStatus,
    ) -> Result<bool, RepositoryError>;

    /// 已结算（写入或跳过）的场景索引，升序
    async fn settled_scenes(&self, chapter_id: Uuid) -> Result<Vec<usize>, RepositoryError>;

    /// 汇总项目下所有章节字数
    async fn sum_word_count(&self, project_id: Uuid) -> Result<u64, RepositoryError>;

    /// 还没有大纲的章节数
    async fn count_without_outline(&self, project_id: Uuid) -> Result<u64, RepositoryError>;
}
