//! Repository for the `jobs` table.
//!
//! All status transitions out of `dispatched`/`running` are fenced
//! compare-and-set updates keyed on `(job_id, attempt_id)`; a callback
//! from a superseded attempt affects zero rows. The claim operation is a
//! single atomic `UPDATE .. RETURNING`, so concurrent dispatch cycles can
//! never double-claim one job, and it enforces the per-batch sliding
//! window in the same statement.

use chrono::Utc;
use sqlx::SqliteExecutor;

use screener_core::leaderboard::LeaderboardEntry;
use screener_core::status::{JobStatus, StatusId};
use screener_core::types::{DbId, Timestamp};

use crate::models::Job;
use crate::DbPool;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, batch_id, candidate_id, candidate, status_id, \
    attempt_count, attempt_id, next_attempt_at, \
    result, error, score, artifacts, \
    created_at, dispatched_at, completed_at";

/// Column list for light page reads: the artifact payload is replaced by
/// NULL so large blobs never leave the database for a light page.
const LIGHT_COLUMNS: &str = "\
    id, batch_id, candidate_id, candidate, status_id, \
    attempt_count, attempt_id, next_attempt_at, \
    result, error, score, NULL AS artifacts, \
    created_at, dispatched_at, completed_at";

/// Outcome of a fenced compare-and-set transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The update matched the active attempt and was applied.
    Applied,
    /// Stale attempt id or already-terminal job: nothing changed.
    Fenced,
}

impl Transition {
    fn from_rows(rows_affected: u64) -> Self {
        if rows_affected > 0 {
            Self::Applied
        } else {
            Self::Fenced
        }
    }
}

/// Provides dispatch, transition, and read operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Atomically claim the next admissible queued job.
    ///
    /// A job is admissible when it is queued, its backoff schedule has
    /// elapsed, its batch (if any) is not terminal, and the batch has
    /// fewer than `max_concurrent` jobs in flight. Claim order is batch
    /// priority descending, then creation order. The new fencing token is
    /// written in the same statement that flips the status.
    pub async fn claim_next(
        pool: &DbPool,
        attempt_id: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let now = Utc::now();
        let query = format!(
            "UPDATE jobs \
             SET status_id = $1, attempt_id = $2, attempt_count = attempt_count + 1, \
                 dispatched_at = $3, next_attempt_at = NULL \
             WHERE id = ( \
                 SELECT j.id FROM jobs j \
                 LEFT JOIN batches b ON b.id = j.batch_id \
                 WHERE j.status_id = $4 \
                   AND (j.next_attempt_at IS NULL OR j.next_attempt_at <= $3) \
                   AND (j.batch_id IS NULL OR b.status_id IN ($5, $6)) \
                   AND (j.batch_id IS NULL OR ( \
                       SELECT COUNT(*) FROM jobs jf \
                       WHERE jf.batch_id = j.batch_id AND jf.status_id IN ($7, $8) \
                   ) < b.max_concurrent) \
                 ORDER BY COALESCE(b.priority, 0) DESC, j.created_at ASC, j.id ASC \
                 LIMIT 1 \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Dispatched.id())
            .bind(attempt_id)
            .bind(now)
            .bind(JobStatus::Queued.id())
            .bind(screener_core::status::BatchStatus::Pending.id())
            .bind(screener_core::status::BatchStatus::Running.id())
            .bind(JobStatus::Dispatched.id())
            .bind(JobStatus::Running.id())
            .fetch_optional(pool)
            .await
    }

    /// Fenced: mark a dispatched job as actually running.
    pub async fn mark_running(
        pool: &DbPool,
        job_id: DbId,
        attempt_id: &str,
    ) -> Result<Transition, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $3 \
             WHERE id = $1 AND attempt_id = $2 AND status_id = $4",
        )
        .bind(job_id)
        .bind(attempt_id)
        .bind(JobStatus::Running.id())
        .bind(JobStatus::Dispatched.id())
        .execute(pool)
        .await?;
        Ok(Transition::from_rows(result.rows_affected()))
    }

    /// Fenced: complete a job with its result payload.
    ///
    /// Takes any executor so the caller can run it inside the same
    /// transaction as the batch counter increment; either both commit or
    /// neither does.
    pub async fn complete(
        executor: impl SqliteExecutor<'_>,
        job_id: DbId,
        attempt_id: &str,
        score: f64,
        metrics: &serde_json::Value,
        artifacts: &serde_json::Value,
    ) -> Result<Transition, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $3, result = $4, score = $5, artifacts = $6, \
                 error = NULL, completed_at = $7 \
             WHERE id = $1 AND attempt_id = $2 AND status_id NOT IN ($8, $9, $10)",
        )
        .bind(job_id)
        .bind(attempt_id)
        .bind(JobStatus::Completed.id())
        .bind(metrics)
        .bind(score)
        .bind(artifacts)
        .bind(Utc::now())
        .bind(JobStatus::Completed.id())
        .bind(JobStatus::Failed.id())
        .bind(JobStatus::Cancelled.id())
        .execute(executor)
        .await?;
        Ok(Transition::from_rows(result.rows_affected()))
    }

    /// Fenced: terminally fail a job after its retries are exhausted.
    ///
    /// Like [`JobRepo::complete`], runs on any executor so it can share a
    /// transaction with the counter increment.
    pub async fn fail(
        executor: impl SqliteExecutor<'_>,
        job_id: DbId,
        attempt_id: &str,
        error: &str,
    ) -> Result<Transition, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $3, error = $4, completed_at = $5 \
             WHERE id = $1 AND attempt_id = $2 AND status_id NOT IN ($6, $7, $8)",
        )
        .bind(job_id)
        .bind(attempt_id)
        .bind(JobStatus::Failed.id())
        .bind(error)
        .bind(Utc::now())
        .bind(JobStatus::Completed.id())
        .bind(JobStatus::Failed.id())
        .bind(JobStatus::Cancelled.id())
        .execute(executor)
        .await?;
        Ok(Transition::from_rows(result.rows_affected()))
    }

    /// Fenced: return a job to the queue for a later retry.
    ///
    /// Clears the fencing token so a late callback from the abandoned
    /// attempt can no longer match, and records when the next attempt may
    /// be claimed.
    pub async fn reschedule(
        pool: &DbPool,
        job_id: DbId,
        attempt_id: &str,
        next_attempt_at: Timestamp,
    ) -> Result<Transition, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $3, attempt_id = NULL, next_attempt_at = $4 \
             WHERE id = $1 AND attempt_id = $2 AND status_id NOT IN ($5, $6, $7)",
        )
        .bind(job_id)
        .bind(attempt_id)
        .bind(JobStatus::Queued.id())
        .bind(next_attempt_at)
        .bind(JobStatus::Completed.id())
        .bind(JobStatus::Failed.id())
        .bind(JobStatus::Cancelled.id())
        .execute(pool)
        .await?;
        Ok(Transition::from_rows(result.rows_affected()))
    }

    /// Find a job by its ID (full row, artifacts included).
    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// One stable-ordered results page for a batch.
    ///
    /// Order is `(created_at, id)`, fixed at submission time, so a page
    /// already served is never reshuffled by later completions. `page` is
    /// 1-based.
    pub async fn results_page(
        pool: &DbPool,
        batch_id: DbId,
        page: i64,
        page_size: i64,
        include_heavy: bool,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let columns = if include_heavy { COLUMNS } else { LIGHT_COLUMNS };
        let query = format!(
            "SELECT {columns} FROM jobs \
             WHERE batch_id = $1 \
             ORDER BY created_at ASC, id ASC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(batch_id)
            .bind(page_size)
            .bind((page - 1).max(0) * page_size)
            .fetch_all(pool)
            .await
    }

    /// Bounded best-first read of a batch's completed scores.
    ///
    /// Backs leaderboard reads for batches with no in-memory board (after
    /// the batch went terminal, or after a restart). `LIMIT` keeps the
    /// scan bounded by the board size, not the batch size.
    pub async fn top_scores(
        pool: &DbPool,
        batch_id: DbId,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
        let rows: Vec<(DbId, String, f64)> = sqlx::query_as(
            "SELECT id, candidate_id, score FROM jobs \
             WHERE batch_id = $1 AND score IS NOT NULL \
             ORDER BY score DESC, id ASC \
             LIMIT $2",
        )
        .bind(batch_id)
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(job_id, candidate_id, score)| LeaderboardEntry {
                job_id,
                candidate_id,
                score,
            })
            .collect())
    }

    /// Number of jobs of one batch currently counted against its window.
    pub async fn in_flight_count(pool: &DbPool, batch_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE batch_id = $1 AND status_id IN ($2, $3)",
        )
        .bind(batch_id)
        .bind(JobStatus::Dispatched.id())
        .bind(JobStatus::Running.id())
        .fetch_one(pool)
        .await
    }

    /// Per-status job counts for a batch, as `(status_id, count)` pairs.
    /// Used by consistency checks and tests, never by the aggregates.
    pub async fn status_counts(
        pool: &DbPool,
        batch_id: DbId,
    ) -> Result<Vec<(StatusId, i64)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT status_id, COUNT(*) FROM jobs \
             WHERE batch_id = $1 GROUP BY status_id ORDER BY status_id",
        )
        .bind(batch_id)
        .fetch_all(pool)
        .await
    }
}
