//! SQLite Lease Store - 持久化任务队列
//!
//! 领取、完成、失败都是带状态条件的单条 UPDATE（CAS），
//! 并发调用方之间不需要任何进程内协调

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use std::sync::Arc;
use uuid::Uuid;

use super::timestamp::{decode, decode_opt, encode};
use super::DbPool;
use crate::application::ports::{
    Clock, FailOutcome, JobCounts, JobRecord, JobStatus, JobType, LeaseFilter, LeaseStorePort,
    RepositoryError,
};
use crate::domain::outline::SceneDescriptor;
use crate::domain::scheduling::RetryDecision;

/// Lease Store 配置
#[derive(Debug, Clone)]
pub struct LeaseStoreConfig {
    /// 租约超时，超过即视为被遗弃
    pub lease_timeout: Duration,
    /// 同一章节的场景任务按顺序串行领取
    pub serialize_chapters: bool,
}

impl Default for LeaseStoreConfig {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::minutes(5),
            serialize_chapters: true,
        }
    }
}

/// SQLite Lease Store
pub struct SqliteLeaseStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
    config: LeaseStoreConfig,
}

impl SqliteLeaseStore {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>, config: LeaseStoreConfig) -> Self {
        Self {
            pool,
            clock,
            config,
        }
    }

    /// 回收 leased_at 严格早于 cutoff 的租约
    async fn reclaim_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = 'pending',
                lease_owner = NULL,
                leased_at = NULL,
                next_retry_at = NULL,
                updated_at = ?
            WHERE status = 'processing' AND leased_at < ?
            "#,
        )
        .bind(encode(self.clock.now()))
        .bind(encode(cutoff))
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            tracing::warn!(reclaimed = reclaimed, "Stale job leases reclaimed");
        }
        Ok(reclaimed)
    }

    async fn update_project_jobs(
        &self,
        project_id: Uuid,
        sql: &str,
        last_error: Option<&str>,
    ) -> Result<u64, RepositoryError> {
        let now = encode(self.clock.now());
        let mut query = sqlx::query(sql).bind(now);
        if let Some(reason) = last_error {
            query = query.bind(reason);
        }
        let result = query
            .bind(project_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

const JOB_COLUMNS: &str = "id, project_id, chapter_id, job_type, status, scene_index, \
     scene_outline, priority, sort_order, attempts, max_attempts, last_error, lease_owner, \
     leased_at, next_retry_at, started_at, completed_at, created_at, updated_at";

#[derive(FromRow)]
struct JobRow {
    id: String,
    project_id: String,
    chapter_id: String,
    job_type: String,
    status: String,
    scene_index: Option<i64>,
    scene_outline: Option<String>,
    priority: i64,
    sort_order: i64,
    attempts: i64,
    max_attempts: i64,
    last_error: Option<String>,
    lease_owner: Option<String>,
    leased_at: Option<String>,
    next_retry_at: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn parse_uuid(raw: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(raw).map_err(|e| RepositoryError::SerializationError(e.to_string()))
}

impl TryFrom<JobRow> for JobRecord {
    type Error = RepositoryError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let scene_outline = row
            .scene_outline
            .as_deref()
            .map(serde_json::from_str::<SceneDescriptor>)
            .transpose()
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        Ok(JobRecord {
            id: parse_uuid(&row.id)?,
            project_id: parse_uuid(&row.project_id)?,
            chapter_id: parse_uuid(&row.chapter_id)?,
            job_type: JobType::from_str(&row.job_type).ok_or_else(|| {
                RepositoryError::SerializationError(format!("unknown job type: {}", row.job_type))
            })?,
            status: JobStatus::from_str(&row.status).ok_or_else(|| {
                RepositoryError::SerializationError(format!("unknown job status: {}", row.status))
            })?,
            scene_index: row.scene_index.map(|i| i.max(0) as usize),
            scene_outline,
            priority: row.priority,
            sort_order: row.sort_order,
            attempts: row.attempts.max(0) as u32,
            max_attempts: row.max_attempts.max(0) as u32,
            last_error: row.last_error,
            lease_owner: row.lease_owner,
            leased_at: decode_opt(row.leased_at.as_deref())?,
            next_retry_at: decode_opt(row.next_retry_at.as_deref())?,
            started_at: decode_opt(row.started_at.as_deref())?,
            completed_at: decode_opt(row.completed_at.as_deref())?,
            created_at: decode(&row.created_at)?,
            updated_at: decode(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl LeaseStorePort for SqliteLeaseStore {
    async fn enqueue(&self, jobs: &[JobRecord]) -> Result<usize, RepositoryError> {
        if jobs.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let mut created = 0usize;
        for job in jobs {
            let scene_outline = job
                .scene_outline
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

            // 唯一索引 (chapter_id, job_type, scene_index) 上冲突即跳过
            let result = sqlx::query(
                r#"
                INSERT INTO generation_jobs (id, project_id, chapter_id, job_type, status,
                    scene_index, scene_outline, priority, sort_order, attempts, max_attempts,
                    created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(job.id.to_string())
            .bind(job.project_id.to_string())
            .bind(job.chapter_id.to_string())
            .bind(job.job_type.as_str())
            .bind(job.status.as_str())
            .bind(job.scene_index.map(|i| i as i64))
            .bind(scene_outline)
            .bind(job.priority)
            .bind(job.sort_order)
            .bind(job.attempts as i64)
            .bind(job.max_attempts as i64)
            .bind(encode(job.created_at))
            .bind(encode(job.updated_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

            created += result.rows_affected() as usize;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(created)
    }

    async fn lease_next(
        &self,
        filter: &LeaseFilter,
        owner: &str,
    ) -> Result<Option<JobRecord>, RepositoryError> {
        let now = self.clock.now();
        self.reclaim_before(now - self.config.lease_timeout).await?;

        // 选择与领取在同一条语句中完成；外层 status = 'pending' 条件保证同一任务只会被领取一次
        let sql = format!(
            r#"
            UPDATE generation_jobs
            SET status = 'processing',
                lease_owner = ?1,
                leased_at = ?2,
                started_at = COALESCE(started_at, ?2),
                updated_at = ?2
            WHERE id = (
                SELECT j.id
                FROM generation_jobs j
                JOIN projects p ON p.id = j.project_id
                WHERE j.status = 'pending'
                  AND (j.next_retry_at IS NULL OR j.next_retry_at <= ?2)
                  AND p.writing_status IN ('generating_outlines', 'writing')
                  AND (?3 IS NULL OR j.project_id = ?3)
                  AND (?4 IS NULL OR j.job_type = ?4)
                  AND (?5 = 0 OR j.job_type != 'write_scene' OR NOT EXISTS (
                        SELECT 1 FROM generation_jobs prev
                        WHERE prev.chapter_id = j.chapter_id
                          AND prev.job_type = 'write_scene'
                          AND prev.scene_index < j.scene_index
                          AND prev.status IN ('pending', 'processing', 'paused')
                  ))
                ORDER BY j.priority DESC, j.sort_order ASC, j.created_at ASC
                LIMIT 1
            )
            AND status = 'pending'
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(owner)
            .bind(encode(now))
            .bind(filter.project_id.map(|id| id.to_string()))
            .bind(filter.job_type.map(|t| t.as_str()))
            .bind(self.config.serialize_chapters as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let job = row.map(JobRecord::try_from).transpose()?;
        if let Some(job) = &job {
            tracing::debug!(
                job_id = %job.id,
                job_type = job.job_type.as_str(),
                owner = owner,
                attempts = job.attempts,
                "Job leased"
            );
        }
        Ok(job)
    }

    async fn lease_job(
        &self,
        job_id: Uuid,
        owner: &str,
    ) -> Result<Option<JobRecord>, RepositoryError> {
        let now = self.clock.now();
        self.reclaim_before(now - self.config.lease_timeout).await?;

        let sql = format!(
            r#"
            UPDATE generation_jobs
            SET status = 'processing',
                lease_owner = ?1,
                leased_at = ?2,
                started_at = COALESCE(started_at, ?2),
                updated_at = ?2
            WHERE id = ?3 AND status IN ('pending', 'paused')
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(owner)
            .bind(encode(now))
            .bind(job_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn complete(&self, job_id: Uuid, owner: &str) -> Result<bool, RepositoryError> {
        let now = encode(self.clock.now());
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = 'completed', completed_at = ?, updated_at = ?
            WHERE id = ? AND status = 'processing' AND lease_owner = ?
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(job_id.to_string())
        .bind(owner)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail(
        &self,
        job_id: Uuid,
        owner: &str,
        error: &str,
        decision: RetryDecision,
    ) -> Result<FailOutcome, RepositoryError> {
        let now = self.clock.now();

        match decision {
            RetryDecision::Retry {
                delay,
                consume_attempt,
            } => {
                let next_retry_at = now + delay;
                let attempts: Option<(i64,)> = sqlx::query_as(
                    r#"
                    UPDATE generation_jobs
                    SET status = 'pending',
                        attempts = attempts + ?,
                        last_error = ?,
                        next_retry_at = ?,
                        lease_owner = NULL,
                        leased_at = NULL,
                        updated_at = ?
                    WHERE id = ? AND status = 'processing' AND lease_owner = ?
                    RETURNING attempts
                    "#,
                )
                .bind(if consume_attempt { 1_i64 } else { 0 })
                .bind(error)
                .bind(encode(next_retry_at))
                .bind(encode(now))
                .bind(job_id.to_string())
                .bind(owner)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

                Ok(match attempts {
                    Some((attempts,)) => FailOutcome::Rescheduled {
                        attempts: attempts.max(0) as u32,
                        next_retry_at,
                    },
                    None => FailOutcome::LeaseLost,
                })
            }
            RetryDecision::GiveUp => {
                let now = encode(now);
                let attempts: Option<(i64,)> = sqlx::query_as(
                    r#"
                    UPDATE generation_jobs
                    SET status = 'failed',
                        attempts = attempts + 1,
                        last_error = ?,
                        next_retry_at = NULL,
                        completed_at = ?,
                        updated_at = ?
                    WHERE id = ? AND status = 'processing' AND lease_owner = ?
                    RETURNING attempts
                    "#,
                )
                .bind(error)
                .bind(&now)
                .bind(&now)
                .bind(job_id.to_string())
                .bind(owner)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

                Ok(match attempts {
                    Some((attempts,)) => FailOutcome::Exhausted {
                        attempts: attempts.max(0) as u32,
                    },
                    None => FailOutcome::LeaseLost,
                })
            }
        }
    }

    async fn reclaim_stale_leases(&self, timeout: Duration) -> Result<u64, RepositoryError> {
        self.reclaim_before(self.clock.now() - timeout).await
    }

    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<JobRecord>, RepositoryError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM generation_jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(job_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn find_unit(
        &self,
        chapter_id: Uuid,
        job_type: JobType,
        scene_index: Option<usize>,
    ) -> Result<Option<JobRecord>, RepositoryError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM generation_jobs \
             WHERE chapter_id = ? AND job_type = ? AND COALESCE(scene_index, -1) = ?",
            JOB_COLUMNS
        ))
        .bind(chapter_id.to_string())
        .bind(job_type.as_str())
        .bind(scene_index.map(|i| i as i64).unwrap_or(-1))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<JobRecord>, RepositoryError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM generation_jobs WHERE project_id = ? \
             ORDER BY priority DESC, sort_order ASC, created_at ASC",
            JOB_COLUMNS
        ))
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }

    async fn job_counts(&self, project_id: Uuid) -> Result<JobCounts, RepositoryError> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT status, job_type, COUNT(*)
            FROM generation_jobs
            WHERE project_id = ?
            GROUP BY status, job_type
            "#,
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let mut counts = JobCounts::default();
        for (status, job_type, count) in rows {
            let count = count.max(0) as u64;
            let status = JobStatus::from_str(&status).ok_or_else(|| {
                RepositoryError::SerializationError(format!("unknown job status: {}", status))
            })?;
            match status {
                JobStatus::Pending => counts.pending += count,
                JobStatus::Processing => counts.processing += count,
                JobStatus::Paused => counts.paused += count,
                JobStatus::Completed => counts.completed += count,
                JobStatus::Failed => counts.failed += count,
            }
            if !status.is_terminal() && job_type == JobType::GenerateOutline.as_str() {
                counts.active_outlines += count;
            }
        }
        Ok(counts)
    }

    async fn next_eligible_at(
        &self,
        project_id: Option<Uuid>,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let now = encode(self.clock.now());
        let (earliest,): (Option<String>,) = sqlx::query_as(
            r#"
            SELECT MIN(COALESCE(j.next_retry_at, ?1))
            FROM generation_jobs j
            JOIN projects p ON p.id = j.project_id
            WHERE j.status = 'pending'
              AND p.writing_status IN ('generating_outlines', 'writing')
              AND (?2 IS NULL OR j.project_id = ?2)
            "#,
        )
        .bind(&now)
        .bind(project_id.map(|id| id.to_string()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        decode_opt(earliest.as_deref())
    }

    async fn pause_project(&self, project_id: Uuid) -> Result<u64, RepositoryError> {
        self.update_project_jobs(
            project_id,
            "UPDATE generation_jobs SET status = 'paused', updated_at = ? \
             WHERE project_id = ? AND status = 'pending'",
            None,
        )
        .await
    }

    async fn resume_project(&self, project_id: Uuid) -> Result<u64, RepositoryError> {
        self.update_project_jobs(
            project_id,
            "UPDATE generation_jobs SET status = 'pending', updated_at = ? \
             WHERE project_id = ? AND status = 'paused'",
            None,
        )
        .await
    }

    async fn cancel_project(&self, project_id: Uuid, reason: &str) -> Result<u64, RepositoryError> {
        let cancelled = self
            .update_project_jobs(
                project_id,
                "UPDATE generation_jobs SET status = 'failed', completed_at = ?1, updated_at = ?1, \
                 last_error = ?2, next_retry_at = NULL \
                 WHERE project_id = ?3 AND status IN ('pending', 'paused')",
                Some(reason),
            )
            .await?;

        if cancelled > 0 {
            tracing::info!(project_id = %project_id, cancelled = cancelled, reason = reason, "Queued jobs cancelled");
        }
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        ChapterRecord, ChapterRepositoryPort, ProjectRecord, ProjectRepositoryPort, ProjectStatus,
    };
    use crate::infrastructure::persistence::sqlite::{
        create_pool, run_migrations, DatabaseConfig, SqliteChapterRepository,
        SqliteProjectRepository,
    };
    use crate::test_support::ManualClock;

    struct Fixture {
        store: Arc<SqliteLeaseStore>,
        clock: Arc<ManualClock>,
        projects: SqliteProjectRepository,
        project: ProjectRecord,
        chapters: Vec<ChapterRecord>,
    }

    async fn fixture_with(config: DatabaseConfig, serialize_chapters: bool) -> Fixture {
        let pool = create_pool(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let clock = Arc::new(ManualClock::default());
        let projects = SqliteProjectRepository::new(pool.clone(), clock.clone());
        let chapter_repo = SqliteChapterRepository::new(pool.clone(), clock.clone());

        let project = ProjectRecord::new("Harbour Lights", "literary", 10_000);
        projects.save(&project).await.unwrap();
        projects
            .transition_status(project.id, &[ProjectStatus::Idle], ProjectStatus::Writing, None)
            .await
            .unwrap();

        let mut chapters = Vec::new();
        for i in 0..2 {
            let chapter = ChapterRecord::new(project.id, i, format!("Chapter {}", i + 1), "");
            chapter_repo.save(&chapter).await.unwrap();
            chapters.push(chapter);
        }

        let store = Arc::new(SqliteLeaseStore::new(
            pool,
            clock.clone(),
            LeaseStoreConfig {
                lease_timeout: Duration::minutes(5),
                serialize_chapters,
            },
        ));

        Fixture {
            store,
            clock,
            projects,
            project,
            chapters,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(DatabaseConfig::in_memory(), true).await
    }

    fn scene_job(f: &Fixture, chapter: usize, index: usize) -> JobRecord {
        let chapter = &f.chapters[chapter];
        JobRecord::scene(
            f.project.id,
            chapter.id,
            chapter.sort_order,
            index,
            SceneDescriptor::new(index as u32 + 1, format!("Scene {}", index + 1), 500),
            15,
            f.clock.now(),
        )
    }

    fn outline_job(f: &Fixture, chapter: usize) -> JobRecord {
        let chapter = &f.chapters[chapter];
        JobRecord::outline(f.project.id, chapter.id, chapter.sort_order, 15, f.clock.now())
    }

    fn backoff(secs: i64) -> RetryDecision {
        RetryDecision::Retry {
            delay: Duration::seconds(secs),
            consume_attempt: true,
        }
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_per_unit() {
        let f = fixture().await;
        let jobs = vec![outline_job(&f, 0), scene_job(&f, 0, 0), scene_job(&f, 0, 1)];
        assert_eq!(f.store.enqueue(&jobs).await.unwrap(), 3);

        // 新 ID 同一工作单元
        let again = vec![outline_job(&f, 0), scene_job(&f, 0, 1), scene_job(&f, 0, 2)];
        assert_eq!(f.store.enqueue(&again).await.unwrap(), 1);
        assert_eq!(f.store.find_by_project(f.project.id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_lease_prefers_priority_then_sort_order() {
        let f = fixture().await;
        f.store
            .enqueue(&[scene_job(&f, 0, 0), outline_job(&f, 1), outline_job(&f, 0)])
            .await
            .unwrap();

        let first = f.store.lease_next(&LeaseFilter::any(), "w").await.unwrap().unwrap();
        assert_eq!(first.job_type, JobType::GenerateOutline);
        assert_eq!(first.chapter_id, f.chapters[0].id);
        assert_eq!(first.status, JobStatus::Processing);
        assert_eq!(first.lease_owner.as_deref(), Some("w"));

        let second = f.store.lease_next(&LeaseFilter::any(), "w").await.unwrap().unwrap();
        assert_eq!(second.chapter_id, f.chapters[1].id);

        let third = f.store.lease_next(&LeaseFilter::any(), "w").await.unwrap().unwrap();
        assert_eq!(third.job_type, JobType::WriteScene);

        assert!(f.store.lease_next(&LeaseFilter::any(), "w").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lease_filter_by_job_type_and_project() {
        let f = fixture().await;
        f.store
            .enqueue(&[outline_job(&f, 0), scene_job(&f, 1, 0)])
            .await
            .unwrap();

        let filter = LeaseFilter {
            project_id: Some(f.project.id),
            job_type: Some(JobType::WriteScene),
        };
        let job = f.store.lease_next(&filter, "w").await.unwrap().unwrap();
        assert_eq!(job.job_type, JobType::WriteScene);

        let other = LeaseFilter::project(Uuid::new_v4());
        assert!(f.store.lease_next(&other, "w").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactive_project_jobs_are_not_leased() {
        let f = fixture().await;
        f.store.enqueue(&[outline_job(&f, 0)]).await.unwrap();
        f.projects
            .transition_status(
                f.project.id,
                &ProjectStatus::ACTIVE,
                ProjectStatus::Paused,
                None,
            )
            .await
            .unwrap();

        assert!(f.store.lease_next(&LeaseFilter::any(), "w").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_serialized_scenes_wait_for_predecessor() {
        let f = fixture().await;
        f.store
            .enqueue(&[scene_job(&f, 0, 0), scene_job(&f, 0, 1), scene_job(&f, 1, 0)])
            .await
            .unwrap();

        let a = f.store.lease_next(&LeaseFilter::any(), "a").await.unwrap().unwrap();
        assert_eq!(a.scene_index, Some(0));
        assert_eq!(a.chapter_id, f.chapters[0].id);

        // 第一章场景 1 必须等场景 0 结束，只能领到第二章
        let b = f.store.lease_next(&LeaseFilter::any(), "b").await.unwrap().unwrap();
        assert_eq!(b.chapter_id, f.chapters[1].id);
        assert!(f.store.lease_next(&LeaseFilter::any(), "c").await.unwrap().is_none());

        assert!(f.store.complete(a.id, "a").await.unwrap());
        let c = f.store.lease_next(&LeaseFilter::any(), "c").await.unwrap().unwrap();
        assert_eq!(c.scene_index, Some(1));
    }

    #[tokio::test]
    async fn test_unserialized_scenes_lease_in_parallel() {
        let f = fixture_with(DatabaseConfig::in_memory(), false).await;
        f.store
            .enqueue(&[scene_job(&f, 0, 0), scene_job(&f, 0, 1)])
            .await
            .unwrap();

        assert!(f.store.lease_next(&LeaseFilter::any(), "a").await.unwrap().is_some());
        assert!(f.store.lease_next(&LeaseFilter::any(), "b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_leases_grant_one_owner() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::new(dir.path().join("lease.db")).with_max_connections(8);
        let f = fixture_with(config, true).await;
        f.store.enqueue(&[outline_job(&f, 0)]).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = f.store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .lease_next(&LeaseFilter::any(), &format!("worker-{}", i))
                    .await
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn test_complete_is_single_shot() {
        let f = fixture().await;
        f.store.enqueue(&[outline_job(&f, 0)]).await.unwrap();
        let job = f.store.lease_next(&LeaseFilter::any(), "w").await.unwrap().unwrap();

        assert!(!f.store.complete(job.id, "someone-else").await.unwrap());
        assert!(f.store.complete(job.id, "w").await.unwrap());
        assert!(!f.store.complete(job.id, "w").await.unwrap());

        let stored = f.store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_lease_reclaim_window_is_strict() {
        let f = fixture().await;
        f.store.enqueue(&[outline_job(&f, 0)]).await.unwrap();
        let job = f.store.lease_next(&LeaseFilter::any(), "w").await.unwrap().unwrap();

        // 恰好 5 分钟：不回收
        f.clock.advance(Duration::minutes(5));
        assert_eq!(f.store.reclaim_stale_leases(Duration::minutes(5)).await.unwrap(), 0);

        f.clock.advance(Duration::milliseconds(1));
        assert_eq!(f.store.reclaim_stale_leases(Duration::minutes(5)).await.unwrap(), 1);
        // 幂等
        assert_eq!(f.store.reclaim_stale_leases(Duration::minutes(5)).await.unwrap(), 0);

        let stored = f.store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.lease_owner, None);
        assert_eq!(stored.attempts, 0);

        // 原持有者已失去租约
        assert!(!f.store.complete(job.id, "w").await.unwrap());
    }

    #[tokio::test]
    async fn test_lease_next_reclaims_first() {
        let f = fixture().await;
        f.store.enqueue(&[outline_job(&f, 0)]).await.unwrap();
        let abandoned = f.store.lease_next(&LeaseFilter::any(), "dead").await.unwrap().unwrap();

        f.clock.advance(Duration::minutes(6));
        let job = f.store.lease_next(&LeaseFilter::any(), "alive").await.unwrap().unwrap();
        assert_eq!(job.id, abandoned.id);
        assert_eq!(job.lease_owner.as_deref(), Some("alive"));
    }

    #[tokio::test]
    async fn test_fail_reschedules_into_the_future() {
        let f = fixture().await;
        f.store.enqueue(&[outline_job(&f, 0)]).await.unwrap();
        let job = f.store.lease_next(&LeaseFilter::any(), "w").await.unwrap().unwrap();

        let outcome = f.store.fail(job.id, "w", "timeout", backoff(10)).await.unwrap();
        assert_eq!(
            outcome,
            FailOutcome::Rescheduled {
                attempts: 1,
                next_retry_at: f.clock.now() + Duration::seconds(10)
            }
        );

        // 重试时间未到不可领取
        assert!(f.store.lease_next(&LeaseFilter::any(), "w").await.unwrap().is_none());
        assert_eq!(
            f.store.next_eligible_at(Some(f.project.id)).await.unwrap(),
            Some(f.clock.now() + Duration::seconds(10))
        );

        f.clock.advance(Duration::seconds(10));
        let again = f.store.lease_next(&LeaseFilter::any(), "w").await.unwrap().unwrap();
        assert_eq!(again.id, job.id);
        assert_eq!(again.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_backpressure_retry_keeps_attempts() {
        let f = fixture().await;
        f.store.enqueue(&[outline_job(&f, 0)]).await.unwrap();
        let job = f.store.lease_next(&LeaseFilter::any(), "w").await.unwrap().unwrap();

        let decision = RetryDecision::Retry {
            delay: Duration::seconds(60),
            consume_attempt: false,
        };
        let outcome = f.store.fail(job.id, "w", "rate limited", decision).await.unwrap();
        assert!(matches!(outcome, FailOutcome::Rescheduled { attempts: 0, .. }));
    }

    #[tokio::test]
    async fn test_give_up_marks_failed() {
        let f = fixture().await;
        f.store.enqueue(&[outline_job(&f, 0)]).await.unwrap();
        let job = f.store.lease_next(&LeaseFilter::any(), "w").await.unwrap().unwrap();

        let outcome = f
            .store
            .fail(job.id, "w", "bad output", RetryDecision::GiveUp)
            .await
            .unwrap();
        assert_eq!(outcome, FailOutcome::Exhausted { attempts: 1 });
        assert_eq!(
            f.store.fail(job.id, "w", "again", RetryDecision::GiveUp).await.unwrap(),
            FailOutcome::LeaseLost
        );

        let stored = f.store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_pause_resume_cancel_and_counts() {
        let f = fixture().await;
        f.store
            .enqueue(&[outline_job(&f, 0), outline_job(&f, 1), scene_job(&f, 0, 0)])
            .await
            .unwrap();
        let leased = f.store.lease_next(&LeaseFilter::any(), "w").await.unwrap().unwrap();

        assert_eq!(f.store.pause_project(f.project.id).await.unwrap(), 2);
        let counts = f.store.job_counts(f.project.id).await.unwrap();
        assert_eq!(counts.paused, 2);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.active_outlines, 2);
        assert_eq!(counts.active(), 3);

        assert_eq!(f.store.resume_project(f.project.id).await.unwrap(), 2);
        assert_eq!(f.store.cancel_project(f.project.id, "cancelled").await.unwrap(), 2);

        let counts = f.store.job_counts(f.project.id).await.unwrap();
        assert_eq!(counts.failed, 2);
        assert_eq!(counts.processing, 1);

        // 执行中的任务不受取消影响
        assert!(f.store.complete(leased.id, "w").await.unwrap());
    }

    #[tokio::test]
    async fn test_lease_job_takes_over_queued_unit() {
        let f = fixture().await;
        f.store.enqueue(&[scene_job(&f, 0, 0)]).await.unwrap();

        let unit = f
            .store
            .find_unit(f.chapters[0].id, JobType::WriteScene, Some(0))
            .await
            .unwrap()
            .unwrap();
        assert!(f
            .store
            .find_unit(f.chapters[0].id, JobType::GenerateOutline, None)
            .await
            .unwrap()
            .is_none());

        let claimed = f.store.lease_job(unit.id, "driver").await.unwrap().unwrap();
        assert_eq!(claimed.lease_owner.as_deref(), Some("driver"));
        assert_eq!(
            claimed.scene_outline.map(|s| s.title),
            Some("Scene 1".to_string())
        );
        assert!(f.store.lease_job(unit.id, "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lease_job_reclaims_abandoned_unit() {
        let f = fixture().await;
        f.store.enqueue(&[outline_job(&f, 0)]).await.unwrap();
        let held = f
            .store
            .lease_next(&LeaseFilter::any(), "crashed")
            .await
            .unwrap()
            .unwrap();

        // 租约仍然有效时不能被接管
        assert!(f.store.lease_job(held.id, "driver").await.unwrap().is_none());

        f.clock.advance(Duration::minutes(30));
        let claimed = f.store.lease_job(held.id, "driver").await.unwrap().unwrap();
        assert_eq!(claimed.lease_owner.as_deref(), Some("driver"));
        assert_eq!(claimed.attempts, 0);
        assert!(!f.store.complete(held.id, "crashed").await.unwrap());
        assert!(f.store.complete(held.id, "driver").await.unwrap());
    }
}
