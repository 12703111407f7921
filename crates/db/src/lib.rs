//! Durable status store: SQLite pool, inline migrations, and repositories.
//!
//! Everything the orchestration engine persists lives in two tables,
//! `batches` and `jobs`. Migrations are tracked in a `_migrations` table so
//! non-idempotent statements run exactly once per database file.

pub mod models;
pub mod repositories;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

/// Connection pool alias used across the workspace.
pub type DbPool = SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Main database handle wrapping a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn new(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            db_path: path.to_owned(),
        };
        db.run_migrations().await?;

        tracing::info!(path = %path.display(), "Database opened");
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    ///
    /// Uses `shared_cache(true)` so all pool connections share the same
    /// in-memory database; without it each connection would get its own.
    pub async fn new_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Self {
            pool,
            db_path: PathBuf::new(),
        };
        db.run_migrations().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Run all inline migrations that have not been applied yet.
    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        for (version, statements) in MIGRATIONS {
            let applied: Option<i64> =
                sqlx::query_scalar("SELECT version FROM _migrations WHERE version = $1")
                    .bind(version)
                    .fetch_optional(&self.pool)
                    .await?;
            if applied.is_some() {
                continue;
            }

            let mut tx = self.pool.begin().await?;
            for statement in *statements {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query("INSERT INTO _migrations (version) VALUES ($1)")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::debug!(version, "Applied migration");
        }

        Ok(())
    }
}

/// Ordered schema migrations: `(version, statements)`.
const MIGRATIONS: &[(i64, &[&str])] = &[(
    1,
    &[
        "CREATE TABLE batches (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL,
            target          TEXT NOT NULL,
            status_id       INTEGER NOT NULL DEFAULT 1,
            total_jobs      INTEGER NOT NULL,
            completed_jobs  INTEGER NOT NULL DEFAULT 0,
            failed_jobs     INTEGER NOT NULL DEFAULT 0,
            cancelled_jobs  INTEGER NOT NULL DEFAULT 0,
            max_concurrent  INTEGER NOT NULL,
            priority        INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            completed_at    TEXT
        )",
        "CREATE TABLE jobs (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id        INTEGER REFERENCES batches(id),
            candidate_id    TEXT NOT NULL,
            candidate       TEXT NOT NULL,
            status_id       INTEGER NOT NULL DEFAULT 1,
            attempt_count   INTEGER NOT NULL DEFAULT 0,
            attempt_id      TEXT,
            next_attempt_at TEXT,
            result          TEXT,
            error           TEXT,
            score           REAL,
            artifacts       TEXT,
            created_at      TEXT NOT NULL,
            dispatched_at   TEXT,
            completed_at    TEXT
        )",
        "CREATE INDEX idx_jobs_batch_status ON jobs (batch_id, status_id)",
        "CREATE INDEX idx_jobs_claimable ON jobs (status_id, next_attempt_at)",
        "CREATE INDEX idx_jobs_page_order ON jobs (batch_id, created_at, id)",
    ],
)];
