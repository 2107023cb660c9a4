//! Worker HTTP Handler
//!
//! HTTP 自触发的目标：每个请求执行一次拉取式调用

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::LeaseFilter;
use crate::infrastructure::adapters::TickRequest;
use crate::infrastructure::http::dto::{ApiResponse, TickResponse};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 执行一次工作者调用
pub async fn worker_tick(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TickRequest>,
) -> Result<Json<ApiResponse<TickResponse>>, ApiError> {
    let filter = LeaseFilter {
        project_id: req.project_id,
        job_type: None,
    };
    let outcome = state.worker.run_once(filter).await?;

    Ok(Json(ApiResponse::success(outcome.into())))
}
