//! Generation Commands - 项目生成控制

use uuid::Uuid;

/// 开始生成
#[derive(Debug, Clone)]
pub struct StartGeneration {
    pub project_id: Uuid,
}

/// 暂停生成
#[derive(Debug, Clone)]
pub struct PauseGeneration {
    pub project_id: Uuid,
}

/// 恢复生成
#[derive(Debug, Clone)]
pub struct ResumeGeneration {
    pub project_id: Uuid,
}

/// 取消生成（项目进入 failed，原因 "cancelled"）
#[derive(Debug, Clone)]
pub struct CancelGeneration {
    pub project_id: Uuid,
}
