//! Batch aggregate derivation.
//!
//! The aggregator increments counters atomically in the store; this module
//! owns the pure rules that turn those counters into a batch status.

use crate::status::BatchStatus;

/// Counter snapshot for one batch, as read back after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCounters {
    pub total_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub cancelled_jobs: i64,
}

impl BatchCounters {
    pub fn terminal_jobs(&self) -> i64 {
        self.completed_jobs + self.failed_jobs + self.cancelled_jobs
    }

    /// Counters can only exceed the total if a terminal transition was
    /// double-counted. The caller logs this as an aggregation
    /// inconsistency; it is never surfaced to users.
    pub fn is_consistent(&self) -> bool {
        self.completed_jobs >= 0
            && self.failed_jobs >= 0
            && self.cancelled_jobs >= 0
            && self.terminal_jobs() <= self.total_jobs
    }
}

/// Derive the batch status from its counters.
///
/// - all jobs terminal, none failed → `Completed`
/// - all jobs terminal, some (not all) failed → `PartiallyFailed`
/// - all jobs terminal, all failed → `Failed`
/// - any job cancelled and the rest terminal → the batch was cancelled
/// - otherwise → `Running`
pub fn derive_batch_status(counters: &BatchCounters) -> BatchStatus {
    if counters.terminal_jobs() < counters.total_jobs {
        return BatchStatus::Running;
    }
    if counters.cancelled_jobs > 0 {
        return BatchStatus::Cancelled;
    }
    if counters.failed_jobs == 0 {
        BatchStatus::Completed
    } else if counters.failed_jobs < counters.total_jobs {
        BatchStatus::PartiallyFailed
    } else {
        BatchStatus::Failed
    }
}
