//! Progress Queries

use uuid::Uuid;

/// 获取项目生成进度
#[derive(Debug, Clone)]
pub struct GetProjectProgress {
    pub project_id: Uuid,
}
