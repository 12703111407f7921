//! Background dispatch queue.
//!
//! A single long-lived Tokio task polls for admissible jobs every
//! `poll_interval` and hands them to the worker executor. Admission is a
//! sliding window: the claim query refuses jobs whose batch already has
//! `max_concurrent` jobs in flight, so finishing (or retry-parking) one
//! job is what admits the next; a large batch is never dispatched all at
//! once. An optional global in-flight cap and a dispatch rate cap sit on
//! top of the per-batch window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use screener_db::models::{Batch, Job};
use screener_db::repositories::{BatchRepo, JobRepo};

use crate::executor::{WorkerExecutor, WorkerOutcome};
use crate::store::StatusStore;

/// Default polling interval for the dispatcher loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default per-attempt execution timeout.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// Default cap on dispatches per second.
pub const DEFAULT_MAX_DISPATCH_PER_SEC: u32 = 50;

/// Dispatch queue tuning knobs.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How often the loop looks for admissible jobs.
    pub poll_interval: Duration,
    /// Per-attempt execution timeout; a timeout is a retryable failure.
    pub job_timeout: Duration,
    /// Upper bound on claims per second.
    pub max_dispatch_per_sec: u32,
    /// Optional global in-flight cap across all batches. The per-batch
    /// window is always enforced; this knob is for a shared worker pool.
    pub global_max_in_flight: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            max_dispatch_per_sec: DEFAULT_MAX_DISPATCH_PER_SEC,
            global_max_in_flight: None,
        }
    }
}

/// Background job dispatcher.
pub struct DispatchQueue {
    store: Arc<StatusStore>,
    executor: Arc<dyn WorkerExecutor>,
    config: DispatchConfig,
    global_slots: Option<Arc<Semaphore>>,
}

impl DispatchQueue {
    pub fn new(
        store: Arc<StatusStore>,
        executor: Arc<dyn WorkerExecutor>,
        config: DispatchConfig,
    ) -> Self {
        let global_slots = config
            .global_max_in_flight
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        Self {
            store,
            executor,
            config,
            global_slots,
        }
    }

    /// Run the dispatcher loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            global_cap = self.config.global_max_in_flight,
            "Dispatch queue started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Dispatch queue shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.try_dispatch().await {
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }
    }

    /// One dispatch cycle: claim admissible jobs until the window, the
    /// global cap, or the queue itself runs dry.
    async fn try_dispatch(&self) -> Result<(), sqlx::Error> {
        let gap = Duration::from_secs_f64(1.0 / f64::from(self.config.max_dispatch_per_sec.max(1)));
        let mut first = true;

        loop {
            // Global cap: stop claiming when every shared slot is busy.
            let permit = match &self.global_slots {
                Some(slots) => match slots.clone().try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => break,
                },
                None => None,
            };

            // Rate cap: space claims out inside the cycle.
            if !first {
                tokio::time::sleep(gap).await;
            }
            first = false;

            let attempt_id = Uuid::now_v7().to_string();
            let Some(job) = JobRepo::claim_next(self.store.pool(), &attempt_id).await? else {
                break;
            };

            tracing::info!(
                job_id = job.id,
                batch_id = job.batch_id,
                candidate_id = %job.candidate_id,
                attempt = job.attempt_count,
                "Job claimed for dispatch",
            );

            let batch = match job.batch_id {
                Some(batch_id) => {
                    BatchRepo::mark_running(self.store.pool(), batch_id).await?;
                    BatchRepo::find_by_id(self.store.pool(), batch_id).await?
                }
                None => None,
            };

            self.spawn_execution(job, batch, attempt_id, permit);
        }

        Ok(())
    }

    /// Run one attempt to completion on its own task. The task owns the
    /// global-cap permit (if any) for exactly as long as the attempt is in
    /// flight.
    fn spawn_execution(
        &self,
        job: Job,
        batch: Option<Batch>,
        attempt_id: String,
        permit: Option<tokio::sync::OwnedSemaphorePermit>,
    ) {
        let store = Arc::clone(&self.store);
        let executor = Arc::clone(&self.executor);
        let job_timeout = self.config.job_timeout;

        tokio::spawn(async move {
            let _permit = permit;

            if let Err(e) = store.mark_running(&job, &attempt_id).await {
                tracing::error!(job_id = job.id, error = %e, "Failed to mark job running");
            }

            let target = batch.as_ref().map(|b| &b.target);
            let outcome =
                match tokio::time::timeout(job_timeout, executor.execute(job.id, &job.candidate, target))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => WorkerOutcome::Failed {
                        error: format!("execution timed out after {}s", job_timeout.as_secs()),
                    },
                };

            if let Err(e) = store.apply_outcome(&job, &attempt_id, &outcome).await {
                tracing::error!(
                    job_id = job.id,
                    attempt_id = %attempt_id,
                    error = %e,
                    "Failed to apply attempt outcome",
                );
            }
        });
    }
}
