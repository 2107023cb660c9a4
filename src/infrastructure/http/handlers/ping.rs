//! 存活探测，顺带报告当前使用的驱动器

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::infrastructure::http::state::AppState;

#[derive(Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// `leased` 或 `sequential`
    pub driver: &'static str,
}

pub async fn ping(State(state): State<Arc<AppState>>) -> Json<PingResponse> {
    let driver = state.driver_name();
    Json(PingResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        driver,
    })
}
