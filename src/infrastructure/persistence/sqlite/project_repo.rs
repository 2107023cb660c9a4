//! SQLite Project Repository

use async_trait::async_trait;
use sqlx::FromRow;
use std::sync::Arc;
use uuid::Uuid;

use super::timestamp::{decode, encode};
use super::DbPool;
use crate::application::ports::{
    Clock, ProjectRecord, ProjectRepositoryPort, ProjectStatus, RepositoryError,
};

/// SQLite Project Repository
pub struct SqliteProjectRepository {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl SqliteProjectRepository {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

const PROJECT_COLUMNS: &str = "id, title, genre, writing_status, total_scenes, completed_scenes, \
     failed_scenes, word_count, current_chapter_index, target_word_count, failure_reason, \
     created_at, updated_at";

#[derive(FromRow)]
struct ProjectRow {
    id: String,
    title: String,
    genre: String,
    writing_status: String,
    total_scenes: i64,
    completed_scenes: i64,
    failed_scenes: i64,
    word_count: i64,
    current_chapter_index: i64,
    target_word_count: i64,
    failure_reason: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ProjectRow> for ProjectRecord {
    type Error = RepositoryError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(ProjectRecord {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| RepositoryError::SerializationError(e.to_string()))?,
            title: row.title,
            genre: row.genre,
            writing_status: ProjectStatus::from_str(&row.writing_status).ok_or_else(|| {
                RepositoryError::SerializationError(format!(
                    "unknown project status: {}",
                    row.writing_status
                ))
            })?,
            total_scenes: row.total_scenes.max(0) as u64,
            completed_scenes: row.completed_scenes.max(0) as u64,
            failed_scenes: row.failed_scenes.max(0) as u64,
            word_count: row.word_count.max(0) as u64,
            current_chapter_index: row.current_chapter_index.max(0) as usize,
            target_word_count: row.target_word_count.max(0) as u64,
            failure_reason: row.failure_reason,
            created_at: decode(&row.created_at)?,
            updated_at: decode(&row.updated_at)?,
        })
    }
}

/// 生成 `?, ?, ?` 占位符
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl ProjectRepositoryPort for SqliteProjectRepository {
    async fn save(&self, project: &ProjectRecord) -> Result<(), RepositoryError> {
        // 已存在时只更新外部可编辑的字段，编排器维护的状态和计数不被覆盖
        sqlx::query(
            r#"
            INSERT INTO projects (id, title, genre, writing_status, total_scenes, completed_scenes,
                failed_scenes, word_count, current_chapter_index, target_word_count, failure_reason,
                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                genre = excluded.genre,
                target_word_count = excluded.target_word_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(project.id.to_string())
        .bind(&project.title)
        .bind(&project.genre)
        .bind(project.writing_status.as_str())
        .bind(project.total_scenes as i64)
        .bind(project.completed_scenes as i64)
        .bind(project.failed_scenes as i64)
        .bind(project.word_count as i64)
        .bind(project.current_chapter_index as i64)
        .bind(project.target_word_count as i64)
        .bind(&project.failure_reason)
        .bind(encode(project.created_at))
        .bind(encode(project.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ProjectRecord>, RepositoryError> {
        let row: Option<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {} FROM projects WHERE id = ?",
            PROJECT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        row.map(ProjectRecord::try_from).transpose()
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: &[ProjectStatus],
        to: ProjectStatus,
        reason: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        if from.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            "UPDATE projects SET writing_status = ?, failure_reason = ?, updated_at = ? \
             WHERE id = ? AND writing_status IN ({})",
            placeholders(from.len())
        );
        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(reason)
            .bind(encode(self.clock.now()))
            .bind(id.to_string());
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let won = result.rows_affected() == 1;
        if won {
            tracing::debug!(project_id = %id, status = to.as_str(), "Project status changed");
        }
        Ok(won)
    }

    async fn increment_scene_counters(
        &self,
        id: Uuid,
        completed: u64,
        failed: u64,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE projects
            SET completed_scenes = completed_scenes + ?,
                failed_scenes = failed_scenes + ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(completed as i64)
        .bind(failed as i64)
        .bind(encode(self.clock.now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Project {}", id)));
        }
        Ok(())
    }

    async fn update_word_count(&self, id: Uuid, word_count: u64) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE projects SET word_count = ?, updated_at = ? WHERE id = ?")
            .bind(word_count as i64)
            .bind(encode(self.clock.now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn advance_chapter_index(&self, id: Uuid, index: usize) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE projects SET current_chapter_index = MAX(current_chapter_index, ?), updated_at = ? WHERE id = ?",
        )
        .bind(index as i64)
        .bind(encode(self.clock.now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
