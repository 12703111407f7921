//! Batch entity model.

use serde::Serialize;
use sqlx::FromRow;

use screener_core::aggregate::BatchCounters;
use screener_core::status::StatusId;
use screener_core::types::{DbId, Timestamp};

/// A row from the `batches` table.
///
/// The counter columns are the precomputed aggregate served by the summary
/// endpoint; they are only ever moved by atomic increments, never by
/// re-counting job rows.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Batch {
    pub id: DbId,
    pub name: String,
    pub target: serde_json::Value,
    pub status_id: StatusId,
    pub total_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub cancelled_jobs: i64,
    pub max_concurrent: i64,
    pub priority: i64,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl Batch {
    pub fn counters(&self) -> BatchCounters {
        BatchCounters {
            total_jobs: self.total_jobs,
            completed_jobs: self.completed_jobs,
            failed_jobs: self.failed_jobs,
            cancelled_jobs: self.cancelled_jobs,
        }
    }
}
