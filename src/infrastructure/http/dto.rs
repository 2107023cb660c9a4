//! Data Transfer Objects

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::{
    ChapterProgress, GenerationControlResponse, JobCounts, ProjectProgressResponse,
};
use crate::infrastructure::worker::{InvocationOutcome, JobResult};

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }
}

// ============================================================================
// Generation DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ProjectRequest {
    pub project_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct GenerationControlDto {
    pub project_id: Uuid,
    pub status: String,
    pub jobs_affected: usize,
    /// 顺序模式下本次请求是否启动了后台驱动器
    pub driver_started: bool,
}

impl GenerationControlDto {
    pub fn new(response: GenerationControlResponse, driver_started: bool) -> Self {
        Self {
            project_id: response.project_id,
            status: response.status.as_str().to_string(),
            jobs_affected: response.jobs_affected,
            driver_started,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobCountsDto {
    pub pending: u64,
    pub processing: u64,
    pub paused: u64,
    pub completed: u64,
    pub failed: u64,
}

impl From<JobCounts> for JobCountsDto {
    fn from(counts: JobCounts) -> Self {
        Self {
            pending: counts.pending,
            processing: counts.processing,
            paused: counts.paused,
            completed: counts.completed,
            failed: counts.failed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChapterProgressDto {
    pub id: Uuid,
    pub sort_order: i64,
    pub title: String,
    pub status: String,
    pub scene_count: usize,
    pub current_scene_index: usize,
    pub word_count: u64,
}

impl From<ChapterProgress> for ChapterProgressDto {
    fn from(chapter: ChapterProgress) -> Self {
        Self {
            id: chapter.id,
            sort_order: chapter.sort_order,
            title: chapter.title,
            status: chapter.status,
            scene_count: chapter.scene_count,
            current_scene_index: chapter.current_scene_index,
            word_count: chapter.word_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectProgressDto {
    pub project_id: Uuid,
    pub title: String,
    pub status: String,
    pub failure_reason: Option<String>,
    pub total_scenes: u64,
    pub completed_scenes: u64,
    pub failed_scenes: u64,
    pub word_count: u64,
    pub target_word_count: u64,
    pub current_chapter_index: usize,
    pub jobs: JobCountsDto,
    pub chapters: Vec<ChapterProgressDto>,
    pub updated_at: String,
}

impl From<ProjectProgressResponse> for ProjectProgressDto {
    fn from(progress: ProjectProgressResponse) -> Self {
        Self {
            project_id: progress.project_id,
            title: progress.title,
            status: progress.status,
            failure_reason: progress.failure_reason,
            total_scenes: progress.total_scenes,
            completed_scenes: progress.completed_scenes,
            failed_scenes: progress.failed_scenes,
            word_count: progress.word_count,
            target_word_count: progress.target_word_count,
            current_chapter_index: progress.current_chapter_index,
            jobs: progress.jobs.into(),
            chapters: progress.chapters.into_iter().map(Into::into).collect(),
            updated_at: progress.updated_at,
        }
    }
}

// ============================================================================
// Worker DTOs
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TickResponse {
    /// "idle" | "deferred" | "executed"
    pub outcome: &'static str,
    pub job_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub job_type: Option<&'static str>,
    pub result: Option<&'static str>,
    pub retry_in_secs: Option<u64>,
}

impl From<InvocationOutcome> for TickResponse {
    fn from(outcome: InvocationOutcome) -> Self {
        let empty = Self {
            outcome: "idle",
            job_id: None,
            project_id: None,
            job_type: None,
            result: None,
            retry_in_secs: None,
        };

        match outcome {
            InvocationOutcome::Idle => empty,
            InvocationOutcome::Deferred { retry_in } => Self {
                outcome: "deferred",
                retry_in_secs: Some(retry_in.as_secs()),
                ..empty
            },
            InvocationOutcome::Executed {
                job_id,
                project_id,
                job_type,
                result,
            } => Self {
                outcome: "executed",
                job_id: Some(job_id),
                project_id: Some(project_id),
                job_type: Some(job_type.as_str()),
                result: Some(match result {
                    JobResult::OutlineStored { .. } => "outline_stored",
                    JobResult::SceneWritten { .. } => "scene_written",
                    JobResult::AlreadyWritten => "already_written",
                    JobResult::Rescheduled { .. } => "rescheduled",
                    JobResult::Exhausted { .. } => "exhausted",
                    JobResult::LeaseLost => "lease_lost",
                }),
                ..empty
            },
        }
    }
}
