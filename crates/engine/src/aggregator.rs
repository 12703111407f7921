//! Incremental batch aggregation.
//!
//! Runs once per terminal job transition: one atomic counter increment,
//! one derived-status write, one leaderboard offer. Nothing here ever
//! re-reads or re-counts job rows, so aggregate reads stay constant-time
//! regardless of batch size.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqliteConnection;
use tokio::sync::Mutex;

use screener_core::aggregate::BatchCounters;
use screener_core::leaderboard::{Leaderboard, LeaderboardEntry};
use screener_core::status::BatchStatus;
use screener_core::types::DbId;
use screener_db::repositories::batch_repo::TerminalKind;
use screener_db::repositories::{BatchRepo, JobRepo};
use screener_db::DbPool;
use screener_events::{EventBus, StoreEvent};

/// Maintains batch counters, derived status, and per-batch leaderboards.
pub struct ResultAggregator {
    pool: DbPool,
    bus: Arc<EventBus>,
    leaderboard_size: usize,
    boards: Mutex<HashMap<DbId, Leaderboard>>,
}

impl ResultAggregator {
    pub fn new(pool: DbPool, bus: Arc<EventBus>, leaderboard_size: usize) -> Self {
        Self {
            pool,
            bus,
            leaderboard_size,
            boards: Mutex::new(HashMap::new()),
        }
    }

    /// Record one terminal job transition for a batch.
    ///
    /// Must be called exactly once per applied terminal transition and in
    /// the same transaction as the job's terminal compare-and-set, so the
    /// counter and the job row commit or roll back together. The caller
    /// hands the returned update to
    /// [`publish_terminal`](Self::publish_terminal) after the commit.
    pub async fn record_terminal(
        &self,
        conn: &mut SqliteConnection,
        batch_id: DbId,
        kind: TerminalKind,
    ) -> Result<(BatchCounters, BatchStatus), sqlx::Error> {
        BatchRepo::record_terminal_in(conn, batch_id, kind).await
    }

    /// Post-commit half of a terminal transition: consistency check,
    /// leaderboard maintenance, `batch.updated` broadcast. A completed job
    /// may carry a leaderboard entry; failures and cancellations never do.
    pub async fn publish_terminal(
        &self,
        batch_id: DbId,
        counters: &BatchCounters,
        status: BatchStatus,
        entry: Option<LeaderboardEntry>,
    ) {
        if !counters.is_consistent() {
            // Aggregation inconsistency: internal defect, logged only and
            // never surfaced to callers.
            tracing::error!(
                batch_id,
                total = counters.total_jobs,
                completed = counters.completed_jobs,
                failed = counters.failed_jobs,
                cancelled = counters.cancelled_jobs,
                "Batch counters exceed total_jobs",
            );
        }

        if status.is_terminal() {
            // No further completions can arrive; leaderboard reads now go
            // through the bounded score query instead.
            self.boards.lock().await.remove(&batch_id);
        } else if let Some(entry) = entry {
            let mut boards = self.boards.lock().await;
            boards
                .entry(batch_id)
                .or_insert_with(|| Leaderboard::new(self.leaderboard_size))
                .offer(entry);
        }

        self.bus.publish(
            StoreEvent::new("batch.updated")
                .with_batch(batch_id)
                .with_payload(serde_json::json!({
                    "status": status,
                    "completed_jobs": counters.completed_jobs,
                    "failed_jobs": counters.failed_jobs,
                    "cancelled_jobs": counters.cancelled_jobs,
                    "total_jobs": counters.total_jobs,
                })),
        );
    }

    /// Drop a batch's in-memory board. Called when a batch is cancelled
    /// outside the per-job terminal path.
    pub async fn evict(&self, batch_id: DbId) {
        self.boards.lock().await.remove(&batch_id);
    }

    /// Best-first snapshot of a batch's leaderboard.
    ///
    /// Live batches read the in-memory board; terminal or restart-orphaned
    /// batches fall back to a bounded top-K score query.
    pub async fn leaderboard(
        &self,
        batch_id: DbId,
    ) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
        {
            let boards = self.boards.lock().await;
            if let Some(board) = boards.get(&batch_id) {
                return Ok(board.top());
            }
        }
        JobRepo::top_scores(&self.pool, batch_id, self.leaderboard_size).await
    }

    /// Number of batches currently holding an in-memory board.
    pub async fn tracked_batches(&self) -> usize {
        self.boards.lock().await.len()
    }
}
