//! HTTP Error Handling
//!
//! 控制接口的失败统一以 HTTP 200 + `{errno, error, data}` 返回，
//! 调用方只看 `errno` 区分结果。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::application::{ApplicationError, RepositoryError};
use crate::infrastructure::worker::WorkerError;

/// 错误码
pub mod errno {
    pub const NOT_FOUND: i32 = 404;
    pub const CONFLICT: i32 = 409;
    pub const INTERNAL_ERROR: i32 = 500;
    pub const SERVICE_UNAVAILABLE: i32 = 503;
}

/// 错误类别，决定 errno 与日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    /// 项目状态不允许该操作，或已有驱动器在跑
    Conflict,
    Internal,
    /// 生成服务等外部依赖不可用
    Unavailable,
}

impl ErrorKind {
    pub fn errno(self) -> i32 {
        match self {
            ErrorKind::NotFound => errno::NOT_FOUND,
            ErrorKind::Conflict => errno::CONFLICT,
            ErrorKind::Internal => errno::INTERNAL_ERROR,
            ErrorKind::Unavailable => errno::SERVICE_UNAVAILABLE,
        }
    }

    fn is_server_side(self) -> bool {
        matches!(self, ErrorKind::Internal | ErrorKind::Unavailable)
    }
}

/// 失败响应体
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    errno: i32,
    error: &'a str,
    data: Option<()>,
}

/// API 错误
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.kind.errno();
        if self.kind.is_server_side() {
            tracing::error!(errno = code, error = %self.message, "Control request failed");
        } else {
            tracing::warn!(errno = code, error = %self.message, "Control request rejected");
        }

        let body = Envelope {
            errno: code,
            error: &self.message,
            data: None,
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(msg) => ApiError::new(ErrorKind::NotFound, msg),
            RepositoryError::Duplicate(msg) => ApiError::new(ErrorKind::Conflict, msg),
            other => ApiError::new(ErrorKind::Internal, other.to_string()),
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(e: ApplicationError) -> Self {
        match e {
            ApplicationError::Repository(inner) => inner.into(),
            ApplicationError::Generator(inner) => {
                ApiError::new(ErrorKind::Unavailable, inner.to_string())
            }
            other @ ApplicationError::NotFound { .. } => {
                ApiError::new(ErrorKind::NotFound, other.to_string())
            }
            other @ ApplicationError::WrongStatus { .. } => {
                ApiError::new(ErrorKind::Conflict, other.to_string())
            }
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::Application(inner) => inner.into(),
            WorkerError::Repository(inner) => inner.into(),
            WorkerError::ProjectNotFound(id) => {
                ApiError::new(ErrorKind::NotFound, format!("Project not found: {}", id))
            }
            WorkerError::ChapterNotFound(id) => {
                ApiError::new(ErrorKind::NotFound, format!("Chapter not found: {}", id))
            }
            busy @ WorkerError::AlreadyRunning(_) => {
                ApiError::new(ErrorKind::Conflict, busy.to_string())
            }
        }
    }
}
