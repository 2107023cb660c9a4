//! 应用层错误定义

use thiserror::Error;
use uuid::Uuid;

use crate::application::ports::{GeneratorError, ProjectStatus, RepositoryError};

/// 命令与查询共用的错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: Uuid,
    },

    /// 项目当前状态不允许该控制操作
    #[error("cannot {action} project in status '{}'", status.as_str())]
    WrongStatus {
        action: &'static str,
        status: ProjectStatus,
    },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),
}

impl ApplicationError {
    pub fn not_found(resource_type: &'static str, id: Uuid) -> Self {
        Self::NotFound { resource_type, id }
    }

    pub fn wrong_status(action: &'static str, status: ProjectStatus) -> Self {
        Self::WrongStatus { action, status }
    }
}
