//! Lease Store Port - 持久化任务队列与租约
//!
//! 任务状态机:
//! pending → processing → {completed | pending（重试）| failed（预算耗尽）| paused}
//! pending ⇄ paused（项目暂停/恢复），pending/paused → failed（项目取消）
//! processing → pending（过期租约回收，不计入尝试次数）
//!
//! 所有迁移都是以当前状态为条件的 CAS，永远不做无条件覆盖

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::RepositoryError;
use crate::domain::outline::SceneDescriptor;
use crate::domain::scheduling::{
    outline_sort_order, scene_sort_order, RetryDecision, OUTLINE_PRIORITY, SCENE_PRIORITY,
};

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    GenerateOutline,
    WriteScene,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::GenerateOutline => "generate_outline",
            JobType::WriteScene => "write_scene",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "generate_outline" => Some(JobType::GenerateOutline),
            "write_scene" => Some(JobType::WriteScene),
            _ => None,
        }
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Paused,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Paused => "paused",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "paused" => Some(JobStatus::Paused),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// 任务实体（用于持久化）
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub chapter_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub scene_index: Option<usize>,
    /// 场景任务携带的场景描述
    pub scene_outline: Option<SceneDescriptor>,
    pub priority: i64,
    pub sort_order: i64,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub lease_owner: Option<String>,
    pub leased_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    fn pending(
        project_id: Uuid,
        chapter_id: Uuid,
        job_type: JobType,
        priority: i64,
        sort_order: i64,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            chapter_id,
            job_type,
            status: JobStatus::Pending,
            scene_index: None,
            scene_outline: None,
            priority,
            sort_order,
            attempts: 0,
            max_attempts,
            last_error: None,
            lease_owner: None,
            leased_at: None,
            next_retry_at: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 创建大纲任务
    pub fn outline(
        project_id: Uuid,
        chapter_id: Uuid,
        chapter_position: i64,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self::pending(
            project_id,
            chapter_id,
            JobType::GenerateOutline,
            OUTLINE_PRIORITY,
            outline_sort_order(chapter_position),
            max_attempts,
            now,
        )
    }

    /// 创建场景写作任务
    pub fn scene(
        project_id: Uuid,
        chapter_id: Uuid,
        chapter_position: i64,
        scene_index: usize,
        scene: SceneDescriptor,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let mut job = Self::pending(
            project_id,
            chapter_id,
            JobType::WriteScene,
            SCENE_PRIORITY,
            scene_sort_order(chapter_position, scene_index as i64),
            max_attempts,
            now,
        );
        job.scene_index = Some(scene_index);
        job.scene_outline = Some(scene);
        job
    }
}

/// 租约过滤条件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaseFilter {
    pub project_id: Option<Uuid>,
    pub job_type: Option<JobType>,
}

impl LeaseFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn project(project_id: Uuid) -> Self {
        Self {
            project_id: Some(project_id),
            job_type: None,
        }
    }
}

/// 项目任务统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub pending: u64,
    pub processing: u64,
    pub paused: u64,
    pub completed: u64,
    pub failed: u64,
    /// 处于 pending/processing/paused 的大纲任务数
    pub active_outlines: u64,
}

impl JobCounts {
    /// 尚未结算的任务数
    pub fn active(&self) -> u64 {
        self.pending + self.processing + self.paused
    }
}

/// 失败处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// 已重新排期
    Rescheduled {
        attempts: u32,
        next_retry_at: DateTime<Utc>,
    },
    /// 预算耗尽，任务终止
    Exhausted { attempts: u32 },
    /// 租约已不属于调用方（被回收或被他人持有），未做任何修改
    LeaseLost,
}

/// Lease Store Port
#[async_trait]
pub trait LeaseStorePort: Send + Sync {
    /// 入队；同一 (chapter, job_type, scene_index) 只会存在一个任务，返回实际新建数量
    async fn enqueue(&self, jobs: &[JobRecord]) -> Result<usize, RepositoryError>;

    /// 原子领取下一个可执行任务
    ///
    /// 先回收过期租约，再在活跃项目中挑选 next_retry_at 已到期的 pending 任务，
    /// 按 priority 降序、sort_order 升序取一个并以 CAS 标记为 processing
    async fn lease_next(
        &self,
        filter: &LeaseFilter,
        owner: &str,
    ) -> Result<Option<JobRecord>, RepositoryError>;

    /// 领取指定任务（pending/paused → processing），顺序驱动器接管排队任务时使用
    async fn lease_job(
        &self,
        job_id: Uuid,
        owner: &str,
    ) -> Result<Option<JobRecord>, RepositoryError>;

    /// 完成任务（processing → completed），返回是否由本次调用完成迁移
    async fn complete(&self, job_id: Uuid, owner: &str) -> Result<bool, RepositoryError>;

    /// 按重试决策处理失败
    async fn fail(
        &self,
        job_id: Uuid,
        owner: &str,
        error: &str,
        decision: RetryDecision,
    ) -> Result<FailOutcome, RepositoryError>;

    /// 回收租约时间早于 now - timeout 的 processing 任务，返回回收数量
    async fn reclaim_stale_leases(&self, timeout: Duration) -> Result<u64, RepositoryError>;

    /// 根据 ID 查找任务
    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<JobRecord>, RepositoryError>;

    /// 查找某个工作单元对应的任务
    async fn find_unit(
        &self,
        chapter_id: Uuid,
        job_type: JobType,
        scene_index: Option<usize>,
    ) -> Result<Option<JobRecord>, RepositoryError>;

    /// 获取项目所有任务（按 priority 降序、sort_order 升序）
    async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<JobRecord>, RepositoryError>;

    /// 项目任务统计
    async fn job_counts(&self, project_id: Uuid) -> Result<JobCounts, RepositoryError>;

    /// 活跃项目中最早的待重试时间（用于延迟自触发）
    async fn next_eligible_at(
        &self,
        project_id: Option<Uuid>,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError>;

    /// 暂停项目的 pending 任务，返回数量
    async fn pause_project(&self, project_id: Uuid) -> Result<u64, RepositoryError>;

    /// 恢复项目的 paused 任务，返回数量
    async fn resume_project(&self, project_id: Uuid) -> Result<u64, RepositoryError>;

    /// 取消项目：pending/paused 任务标记为 failed，返回数量
    async fn cancel_project(&self, project_id: Uuid, reason: &str)
        -> Result<u64, RepositoryError>;
}
