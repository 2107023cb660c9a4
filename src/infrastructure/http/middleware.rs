//! HTTP Middleware

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use http::StatusCode;

/// 记录传输层失败（4xx/5xx），多数来自请求体解析或未知路由。
///
/// 业务失败走 HTTP 200 + errno，由 `ApiError` 自己记录，这里看不到。
pub async fn error_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match Outcome::of(status) {
        Outcome::Ok => {}
        Outcome::Rejected => tracing::warn!(
            %method, %path, status = status.as_u16(), elapsed_ms,
            "Request rejected before reaching a handler"
        ),
        Outcome::Broken => tracing::error!(
            %method, %path, status = status.as_u16(), elapsed_ms,
            "Request failed with server error"
        ),
    }

    response
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Ok,
    Rejected,
    Broken,
}

impl Outcome {
    fn of(status: StatusCode) -> Self {
        if status.is_server_error() {
            Outcome::Broken
        } else if status.is_client_error() {
            Outcome::Rejected
        } else {
            Outcome::Ok
        }
    }
}
