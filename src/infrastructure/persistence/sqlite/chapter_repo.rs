//! SQLite Chapter Repository
//!
//! 同时实现章节正文的原子累加（ContentAccumulatorPort）

use async_trait::async_trait;
use sqlx::FromRow;
use std::sync::Arc;
use uuid::Uuid;

use super::project_repo::placeholders;
use super::timestamp::{decode, encode};
use super::DbPool;
use crate::application::ports::{
    ChapterRecord, ChapterRepositoryPort, ChapterStatus, Clock, ContentAccumulatorPort,
    RepositoryError,
};
use crate::domain::outline::SceneDescriptor;

/// SQLite Chapter Repository
pub struct SqliteChapterRepository {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

/// scene_results.outcome
const SCENE_WRITTEN: &str = "written";
const SCENE_SKIPPED: &str = "skipped";

impl SqliteChapterRepository {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    fn now(&self) -> String {
        encode(self.clock.now())
    }

    /// 在一个事务里追加正文、推进 current_scene_index 并登记结算记录
    ///
    /// 结算记录已存在时整体回滚，返回 false
    async fn settle_scene(
        &self,
        chapter_id: Uuid,
        scene_index: usize,
        outcome: &str,
        new_text: &str,
        word_delta: u64,
    ) -> Result<bool, RepositoryError> {
        let now = self.now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let updated = sqlx::query(
            r#"
            UPDATE chapters
            SET content = content || ?,
                word_count = word_count + ?,
                current_scene_index = MAX(current_scene_index, ?),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(new_text)
        .bind(word_delta as i64)
        .bind(scene_index as i64 + 1)
        .bind(&now)
        .bind(chapter_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        if updated.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;
            return Err(RepositoryError::NotFound(format!("Chapter {}", chapter_id)));
        }

        let marked = sqlx::query(
            r#"
            INSERT INTO scene_results (chapter_id, scene_index, outcome, settled_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(chapter_id, scene_index) DO NOTHING
            "#,
        )
        .bind(chapter_id.to_string())
        .bind(scene_index as i64)
        .bind(outcome)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        if marked.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;
            tracing::debug!(chapter_id = %chapter_id, scene_index, "Scene already settled");
            return Ok(false);
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;
        Ok(true)
    }
}

const CHAPTER_COLUMNS: &str = "id, project_id, sort_order, title, summary, target_word_count, \
     writing_status, scene_outline, current_scene_index, content, word_count, created_at, updated_at";

#[derive(FromRow)]
struct ChapterRow {
    id: String,
    project_id: String,
    sort_order: i64,
    title: String,
    summary: String,
    target_word_count: Option<i64>,
    writing_status: String,
    scene_outline: Option<String>,
    current_scene_index: i64,
    content: String,
    word_count: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ChapterRow> for ChapterRecord {
    type Error = RepositoryError;

    fn try_from(row: ChapterRow) -> Result<Self, Self::Error> {
        let scene_outline = row
            .scene_outline
            .as_deref()
            .map(serde_json::from_str::<Vec<SceneDescriptor>>)
            .transpose()
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        Ok(ChapterRecord {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| RepositoryError::SerializationError(e.to_string()))?,
            project_id: Uuid::parse_str(&row.project_id)
                .map_err(|e| RepositoryError::SerializationError(e.to_string()))?,
            sort_order: row.sort_order,
            title: row.title,
            summary: row.summary,
            target_word_count: row.target_word_count.map(|w| w.max(0) as u64),
            writing_status: ChapterStatus::from_str(&row.writing_status).unwrap_or_default(),
            scene_outline,
            current_scene_index: row.current_scene_index.max(0) as usize,
            content: row.content,
            word_count: row.word_count.max(0) as u64,
            created_at: decode(&row.created_at)?,
            updated_at: decode(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl ChapterRepositoryPort for SqliteChapterRepository {
    async fn save(&self, chapter: &ChapterRecord) -> Result<(), RepositoryError> {
        let scene_outline = chapter
            .scene_outline
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        // 已存在时只更新外部可编辑的字段；大纲、正文、进度只能通过专用操作修改
        sqlx::query(
            r#"
            INSERT INTO chapters (id, project_id, sort_order, title, summary, target_word_count,
                writing_status, scene_outline, current_scene_index, content, word_count,
                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                sort_order = excluded.sort_order,
                title = excluded.title,
                summary = excluded.summary,
                target_word_count = excluded.target_word_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(chapter.id.to_string())
        .bind(chapter.project_id.to_string())
        .bind(chapter.sort_order)
        .bind(&chapter.title)
        .bind(&chapter.summary)
        .bind(chapter.target_word_count.map(|w| w as i64))
        .bind(chapter.writing_status.as_str())
        .bind(scene_outline)
        .bind(chapter.current_scene_index as i64)
        .bind(&chapter.content)
        .bind(chapter.word_count as i64)
        .bind(encode(chapter.created_at))
        .bind(encode(chapter.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ChapterRecord>, RepositoryError> {
        let row: Option<ChapterRow> = sqlx::query_as(&format!(
            "SELECT {} FROM chapters WHERE id = ?",
            CHAPTER_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        row.map(ChapterRecord::try_from).transpose()
    }

    async fn find_by_project(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ChapterRecord>, RepositoryError> {
        let rows: Vec<ChapterRow> = sqlx::query_as(&format!(
            "SELECT {} FROM chapters WHERE project_id = ? ORDER BY sort_order ASC, created_at ASC",
            CHAPTER_COLUMNS
        ))
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(ChapterRecord::try_from).collect()
    }

    async fn store_scene_outline(
        &self,
        chapter_id: Uuid,
        scenes: &[SceneDescriptor],
    ) -> Result<bool, RepositoryError> {
        let outline = serde_json::to_string(scenes)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        // 使用事务确保大纲写入与 total_scenes 累加同时生效
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE chapters
            SET scene_outline = ?,
                writing_status = CASE
                    WHEN writing_status IN ('pending', 'generating_outline') THEN 'outline_ready'
                    ELSE writing_status
                END,
                updated_at = ?
            WHERE id = ? AND scene_outline IS NULL
            "#,
        )
        .bind(&outline)
        .bind(self.now())
        .bind(chapter_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE projects
            SET total_scenes = total_scenes + ?, updated_at = ?
            WHERE id = (SELECT project_id FROM chapters WHERE id = ?)
            "#,
        )
        .bind(scenes.len() as i64)
        .bind(self.now())
        .bind(chapter_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        tracing::debug!(chapter_id = %chapter_id, scenes = scenes.len(), "Scene outline stored");
        Ok(true)
    }

    async fn transition_status(
        &self,
        chapter_id: Uuid,
        from: &[ChapterStatus],
        to: ChapterStatus,
    ) -> Result<bool, RepositoryError> {
        if from.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            "UPDATE chapters SET writing_status = ?, updated_at = ? \
             WHERE id = ? AND writing_status IN ({})",
            placeholders(from.len())
        );
        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(self.now())
            .bind(chapter_id.to_string());
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn settled_scenes(&self, chapter_id: Uuid) -> Result<Vec<usize>, RepositoryError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT scene_index FROM scene_results WHERE chapter_id = ? ORDER BY scene_index ASC",
        )
        .bind(chapter_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(|(index,)| index.max(0) as usize).collect())
    }

    async fn sum_word_count(&self, project_id: Uuid) -> Result<u64, RepositoryError> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(word_count), 0) FROM chapters WHERE project_id = ?",
        )
        .bind(project_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(total.max(0) as u64)
    }

    async fn count_without_outline(&self, project_id: Uuid) -> Result<u64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM chapters WHERE project_id = ? AND scene_outline IS NULL",
        )
        .bind(project_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl ContentAccumulatorPort for SqliteChapterRepository {
    async fn append(
        &self,
        chapter_id: Uuid,
        new_text: &str,
        word_delta: u64,
    ) -> Result<(), RepositoryError> {
        // 单条语句完成读改写，并发追加不会丢失任何一方
        let result = sqlx::query(
            r#"
            UPDATE chapters
            SET content = content || ?,
                word_count = word_count + ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(new_text)
        .bind(word_delta as i64)
        .bind(self.now())
        .bind(chapter_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Chapter {}", chapter_id)));
        }
        Ok(())
    }

    async fn append_scene(
        &self,
        chapter_id: Uuid,
        scene_index: usize,
        new_text: &str,
        word_delta: u64,
    ) -> Result<bool, RepositoryError> {
        self.settle_scene(chapter_id, scene_index, SCENE_WRITTEN, new_text, word_delta)
            .await
    }

    async fn skip_scene(
        &self,
        chapter_id: Uuid,
        scene_index: usize,
    ) -> Result<bool, RepositoryError> {
        self.settle_scene(chapter_id, scene_index, SCENE_SKIPPED, "", 0)
            .await
    }
}
