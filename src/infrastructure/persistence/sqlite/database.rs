//! SQLite Database - 数据库连接和迁移

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// 连接池参数
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            database_url: format!("sqlite:{}?mode=rwc", path.as_ref().display()),
            max_connections: 5,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }
}

pub type DbPool = Pool<Sqlite>;

/// 多个 worker 同时抢租约时的等锁上限（每个连接都要设置）
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// 打开连接池；文件库用 WAL，让租约写入与进度查询互不阻塞
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let mut options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);

    let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);

    if config.is_in_memory() {
        // 内存库随最后一个连接消失，连接不能被回收
        pool_options = pool_options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    } else {
        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
    }

    let pool = pool_options.connect_with(options).await?;

    tracing::info!(
        url = %config.database_url,
        max_connections = config.max_connections,
        "SQLite pool opened"
    );

    Ok(pool)
}

/// 建表语句，按依赖顺序执行；全部幂等
const SCHEMA: &[(&str, &str)] = &[
    (
        "projects",
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            genre TEXT NOT NULL DEFAULT '',
            writing_status TEXT NOT NULL DEFAULT 'idle',
            total_scenes INTEGER NOT NULL DEFAULT 0,
            completed_scenes INTEGER NOT NULL DEFAULT 0,
            failed_scenes INTEGER NOT NULL DEFAULT 0,
            word_count INTEGER NOT NULL DEFAULT 0,
            current_chapter_index INTEGER NOT NULL DEFAULT 0,
            target_word_count INTEGER NOT NULL DEFAULT 0,
            failure_reason TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "chapters",
        r#"
        CREATE TABLE IF NOT EXISTS chapters (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            sort_order INTEGER NOT NULL,
            title TEXT NOT NULL,
            summary TEXT NOT NULL DEFAULT '',
            target_word_count INTEGER,
            writing_status TEXT NOT NULL DEFAULT 'pending',
            scene_outline TEXT,
            current_scene_index INTEGER NOT NULL DEFAULT 0,
            content TEXT NOT NULL DEFAULT '',
            word_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "generation_jobs",
        r#"
        CREATE TABLE IF NOT EXISTS generation_jobs (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            chapter_id TEXT NOT NULL REFERENCES chapters(id) ON DELETE CASCADE,
            job_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            scene_index INTEGER,
            scene_outline TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL DEFAULT 0,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            last_error TEXT,
            lease_owner TEXT,
            leased_at TEXT,
            next_retry_at TEXT,
            started_at TEXT,
            completed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    ),
    // 每个场景至多结算一次；与正文追加在同一事务内写入
    (
        "scene_results",
        r#"
        CREATE TABLE IF NOT EXISTS scene_results (
            chapter_id TEXT NOT NULL REFERENCES chapters(id) ON DELETE CASCADE,
            scene_index INTEGER NOT NULL,
            outcome TEXT NOT NULL,
            settled_at TEXT NOT NULL,
            PRIMARY KEY (chapter_id, scene_index)
        )
        "#,
    ),
    (
        "idx_chapters_project_order",
        "CREATE INDEX IF NOT EXISTS idx_chapters_project_order ON chapters(project_id, sort_order)",
    ),
    // 一个工作单元只对应一条任务，重复入队被忽略
    (
        "uniq_generation_jobs_unit",
        "CREATE UNIQUE INDEX IF NOT EXISTS uniq_generation_jobs_unit \
         ON generation_jobs(chapter_id, job_type, COALESCE(scene_index, -1))",
    ),
    (
        "idx_generation_jobs_lease",
        "CREATE INDEX IF NOT EXISTS idx_generation_jobs_lease \
         ON generation_jobs(status, priority DESC, sort_order)",
    ),
    (
        "idx_generation_jobs_project",
        "CREATE INDEX IF NOT EXISTS idx_generation_jobs_project \
         ON generation_jobs(project_id, status)",
    ),
];

/// 建表建索引，可重复执行
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    for (name, sql) in SCHEMA {
        sqlx::query(sql).execute(pool).await?;
        tracing::debug!(object = name, "Schema object ensured");
    }

    tracing::info!(objects = SCHEMA.len(), "Database schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('projects', 'chapters', 'generation_jobs', 'scene_results')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 4);
    }

    #[tokio::test]
    async fn test_file_db_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::new(dir.path().join("wal.db"));
        let pool = create_pool(&config).await.unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
