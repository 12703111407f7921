//! Repository for the `batches` table.
//!
//! Batch + job creation is all-or-nothing, and the aggregate counters are
//! only ever moved by single-row atomic increments keyed to a job's
//! terminal transition. No operation here re-counts job rows.

use chrono::Utc;
use sqlx::SqliteConnection;

use screener_core::aggregate::{derive_batch_status, BatchCounters};
use screener_core::status::{BatchStatus, JobStatus};
use screener_core::submission::{SubmitBatch, DEFAULT_MAX_CONCURRENT};
use screener_core::types::{DbId, Timestamp};

use crate::models::Batch;
use crate::DbPool;

/// Column list for `batches` queries.
const COLUMNS: &str = "\
    id, name, target, status_id, total_jobs, \
    completed_jobs, failed_jobs, cancelled_jobs, \
    max_concurrent, priority, created_at, completed_at";

/// Which terminal counter a job transition moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    Completed,
    Failed,
    Cancelled,
}

impl TerminalKind {
    fn column(self) -> &'static str {
        match self {
            Self::Completed => "completed_jobs",
            Self::Failed => "failed_jobs",
            Self::Cancelled => "cancelled_jobs",
        }
    }
}

/// Provides CRUD and aggregate operations for batches.
pub struct BatchRepo;

impl BatchRepo {
    /// Create a batch and all of its job rows in one transaction.
    ///
    /// The request must already be validated (`validate_submission`): the
    /// candidate list is non-empty and deduplicated. If any insert fails
    /// the transaction rolls back and no partial batch is ever visible.
    pub async fn create_with_jobs(
        pool: &DbPool,
        request: &SubmitBatch,
    ) -> Result<Batch, sqlx::Error> {
        let now = Utc::now();
        let max_concurrent = request.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT);
        let priority = i64::from(request.priority.unwrap_or(0));

        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO batches \
                 (name, target, status_id, total_jobs, max_concurrent, priority, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        let batch = sqlx::query_as::<_, Batch>(&query)
            .bind(&request.name)
            .bind(&request.target)
            .bind(BatchStatus::Pending.id())
            .bind(request.candidates.len() as i64)
            .bind(max_concurrent)
            .bind(priority)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        for candidate in &request.candidates {
            sqlx::query(
                "INSERT INTO jobs (batch_id, candidate_id, candidate, status_id, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(batch.id)
            .bind(&candidate.id)
            .bind(&candidate.descriptor)
            .bind(JobStatus::Queued.id())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(batch)
    }

    /// Find a batch by its ID.
    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Batch>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM batches WHERE id = $1");
        sqlx::query_as::<_, Batch>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Promote a pending batch to running once its first job dispatches.
    pub async fn mark_running(pool: &DbPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE batches SET status_id = $2 WHERE id = $1 AND status_id = $3")
            .bind(id)
            .bind(BatchStatus::Running.id())
            .bind(BatchStatus::Pending.id())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Record one job's terminal transition: atomically increment the
    /// matching counter, then derive and store the batch status.
    ///
    /// Returns the updated counters and the derived status. Many terminal
    /// transitions may run this concurrently; the increment is a single
    /// relative UPDATE so no transition is ever lost.
    pub async fn record_terminal(
        pool: &DbPool,
        batch_id: DbId,
        kind: TerminalKind,
    ) -> Result<(BatchCounters, BatchStatus), sqlx::Error> {
        let mut tx = pool.begin().await?;
        let update = Self::record_terminal_in(&mut *tx, batch_id, kind).await?;
        tx.commit().await?;
        Ok(update)
    }

    /// Transaction-scoped body of [`BatchRepo::record_terminal`].
    ///
    /// The status store runs this in the same transaction as the job's
    /// terminal compare-and-set, so a job can never commit as terminal
    /// without its batch counter moving with it.
    pub async fn record_terminal_in(
        conn: &mut SqliteConnection,
        batch_id: DbId,
        kind: TerminalKind,
    ) -> Result<(BatchCounters, BatchStatus), sqlx::Error> {
        let increment = format!(
            "UPDATE batches SET {col} = {col} + 1 WHERE id = $1 \
             RETURNING total_jobs, completed_jobs, failed_jobs, cancelled_jobs",
            col = kind.column(),
        );
        let (total_jobs, completed_jobs, failed_jobs, cancelled_jobs): (i64, i64, i64, i64) =
            sqlx::query_as(&increment)
                .bind(batch_id)
                .fetch_one(&mut *conn)
                .await?;

        let counters = BatchCounters {
            total_jobs,
            completed_jobs,
            failed_jobs,
            cancelled_jobs,
        };
        let status = derive_batch_status(&counters);

        let completed_at: Option<Timestamp> = status.is_terminal().then(Utc::now);
        sqlx::query(
            "UPDATE batches SET status_id = $2, \
                 completed_at = COALESCE(completed_at, $3) \
             WHERE id = $1",
        )
        .bind(batch_id)
        .bind(status.id())
        .bind(completed_at)
        .execute(&mut *conn)
        .await?;

        Ok((counters, status))
    }

    /// Cancel a batch: every non-terminal job moves to `cancelled`, the
    /// cancelled counter absorbs them, and the batch itself is closed.
    ///
    /// In-flight worker executions are not interrupted; their late
    /// callbacks are fenced out by the jobs now being terminal. Returns
    /// the number of jobs that were cancelled.
    pub async fn cancel(pool: &DbPool, batch_id: DbId) -> Result<u64, sqlx::Error> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;

        let cancelled = sqlx::query(
            "UPDATE jobs SET status_id = $2, completed_at = $3 \
             WHERE batch_id = $1 AND status_id NOT IN ($4, $5, $6)",
        )
        .bind(batch_id)
        .bind(JobStatus::Cancelled.id())
        .bind(now)
        .bind(JobStatus::Completed.id())
        .bind(JobStatus::Failed.id())
        .bind(JobStatus::Cancelled.id())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            "UPDATE batches SET cancelled_jobs = cancelled_jobs + $2, \
                 status_id = $3, completed_at = COALESCE(completed_at, $4) \
             WHERE id = $1",
        )
        .bind(batch_id)
        .bind(cancelled as i64)
        .bind(BatchStatus::Cancelled.id())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(cancelled)
    }

    /// List batches most recent first (operator view).
    pub async fn list(pool: &DbPool, limit: i64) -> Result<Vec<Batch>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM batches ORDER BY created_at DESC, id DESC LIMIT $1"
        );
        sqlx::query_as::<_, Batch>(&query)
            .bind(limit.clamp(1, 500))
            .fetch_all(pool)
            .await
    }
}
