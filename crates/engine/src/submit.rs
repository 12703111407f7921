//! Batch submission service.
//!
//! Validates, creates the batch and every job row in one transaction, and
//! returns the batch id immediately; dispatch is the queue loop's job,
//! never the submitter's.

use std::sync::Arc;

use screener_core::submission::{validate_submission, SubmitBatch};
use screener_core::types::DbId;
use screener_db::models::Batch;
use screener_db::repositories::BatchRepo;
use screener_db::DbPool;
use screener_events::{EventBus, StoreEvent};

use crate::error::EngineResult;

pub struct BatchSubmissionService {
    pool: DbPool,
    bus: Arc<EventBus>,
    max_candidates: usize,
}

impl BatchSubmissionService {
    pub fn new(pool: DbPool, bus: Arc<EventBus>, max_candidates: usize) -> Self {
        Self {
            pool,
            bus,
            max_candidates,
        }
    }

    /// Validate and persist a submission. Returns the created batch.
    ///
    /// `Validation`/`LimitExceeded` errors come back synchronously; on any
    /// failure the transaction rolls back and no partial batch is visible.
    pub async fn submit(&self, mut request: SubmitBatch) -> EngineResult<Batch> {
        validate_submission(&mut request, self.max_candidates)?;

        let batch = BatchRepo::create_with_jobs(&self.pool, &request).await?;

        tracing::info!(
            batch_id = batch.id,
            name = %batch.name,
            total_jobs = batch.total_jobs,
            max_concurrent = batch.max_concurrent,
            "Batch submitted",
        );
        self.bus.publish(
            StoreEvent::new("batch.created")
                .with_batch(batch.id)
                .with_payload(serde_json::json!({"total_jobs": batch.total_jobs})),
        );

        Ok(batch)
    }

    /// Look a batch up for read paths that live outside the API crate.
    pub async fn find(&self, batch_id: DbId) -> EngineResult<Option<Batch>> {
        Ok(BatchRepo::find_by_id(&self.pool, batch_id).await?)
    }
}
