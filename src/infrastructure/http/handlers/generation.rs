//! Generation HTTP Handlers
//!
//! 开始 / 暂停 / 恢复 / 取消，以及进度查询

use axum::{extract::State, Json};
use std::sync::Arc;
use uuid::Uuid;

use crate::application::{
    CancelGeneration, GetProjectProgress, PauseGeneration, ResumeGeneration, StartGeneration,
};
use crate::infrastructure::http::dto::{
    ApiResponse, GenerationControlDto, ProjectProgressDto, ProjectRequest,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;
use crate::infrastructure::worker::WorkerError;

/// 顺序模式下启动后台驱动器，已在运行时视为成功
fn spawn_sequential(state: &AppState, project_id: Uuid) -> Result<bool, ApiError> {
    let Some(driver) = &state.sequential else {
        return Ok(false);
    };
    match driver.spawn(project_id) {
        Ok(()) => Ok(true),
        Err(WorkerError::AlreadyRunning(_)) => {
            tracing::debug!(project_id = %project_id, "Sequential run already in progress");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// 开始生成
pub async fn start_generation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProjectRequest>,
) -> Result<Json<ApiResponse<GenerationControlDto>>, ApiError> {
    let response = state
        .start_handler
        .handle(StartGeneration {
            project_id: req.project_id,
        })
        .await?;
    let driver_started = spawn_sequential(&state, req.project_id)?;

    Ok(Json(ApiResponse::success(GenerationControlDto::new(
        response,
        driver_started,
    ))))
}

/// 暂停生成
pub async fn pause_generation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProjectRequest>,
) -> Result<Json<ApiResponse<GenerationControlDto>>, ApiError> {
    let response = state
        .pause_handler
        .handle(PauseGeneration {
            project_id: req.project_id,
        })
        .await?;

    Ok(Json(ApiResponse::success(GenerationControlDto::new(
        response, false,
    ))))
}

/// 恢复生成
pub async fn resume_generation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProjectRequest>,
) -> Result<Json<ApiResponse<GenerationControlDto>>, ApiError> {
    let response = state
        .resume_handler
        .handle(ResumeGeneration {
            project_id: req.project_id,
        })
        .await?;
    let driver_started = spawn_sequential(&state, req.project_id)?;

    Ok(Json(ApiResponse::success(GenerationControlDto::new(
        response,
        driver_started,
    ))))
}

/// 取消生成
pub async fn cancel_generation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProjectRequest>,
) -> Result<Json<ApiResponse<GenerationControlDto>>, ApiError> {
    let response = state
        .cancel_handler
        .handle(CancelGeneration {
            project_id: req.project_id,
        })
        .await?;

    Ok(Json(ApiResponse::success(GenerationControlDto::new(
        response, false,
    ))))
}

/// 查询项目进度
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProjectRequest>,
) -> Result<Json<ApiResponse<ProjectProgressDto>>, ApiError> {
    let progress = state
        .progress_handler
        .handle(GetProjectProgress {
            project_id: req.project_id,
        })
        .await?;

    Ok(Json(ApiResponse::success(progress.into())))
}
