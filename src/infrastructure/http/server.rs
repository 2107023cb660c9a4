//! HTTP Server
//!
//! 控制面 HTTP 服务：挂载路由与通用中间件，支持优雅关闭

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::Router;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::middleware::error_logging_middleware;
use super::routes::create_routes;
use super::state::AppState;
use crate::config::ServerConfig;

/// 控制请求都是小 JSON
const MAX_BODY_BYTES: usize = 64 * 1024;

const CORS_MAX_AGE: Duration = Duration::from_secs(3600);

/// 组装带中间件的完整路由
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(CORS_MAX_AGE);

    create_routes()
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(error_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// HTTP 服务器
pub struct HttpServer {
    addr: String,
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ServerConfig, state: AppState) -> Self {
        Self {
            addr: config.addr(),
            router: build_router(Arc::new(state)),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// 监听直到 `shutdown` 完成；在途请求处理完再返回
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.addr).await?;
        tracing::info!(addr = %self.addr, "Control API listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!(addr = %self.addr, "Control API stopped");
        Ok(())
    }
}
