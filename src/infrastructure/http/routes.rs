//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping                  GET   健康检查
//! - /api/generation/start      POST  开始生成
//! - /api/generation/pause      POST  暂停生成
//! - /api/generation/resume     POST  恢复生成
//! - /api/generation/cancel     POST  取消生成
//! - /api/generation/progress   POST  项目进度
//! - /api/worker/tick           POST  执行一次拉取式调用（HTTP 自触发目标）

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new().nest("/api", api_routes())
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .nest("/generation", generation_routes())
        .route("/worker/tick", post(handlers::worker_tick))
}

/// Generation 路由
fn generation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/start", post(handlers::start_generation))
        .route("/pause", post(handlers::pause_generation))
        .route("/resume", post(handlers::resume_generation))
        .route("/cancel", post(handlers::cancel_generation))
        .route("/progress", post(handlers::get_progress))
}
