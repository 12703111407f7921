//! Status store: fenced transitions plus change notification.
//!
//! Every outcome, whether reported by the in-process dispatch path or by
//! an external worker callback, funnels through
//! [`StatusStore::apply_outcome`]. The repo's compare-and-set keyed on
//! `(job_id, attempt_id)` makes terminal states idempotent and silently
//! drops callbacks from superseded attempts; applied transitions are
//! pushed to subscribers and handed to the aggregator exactly once.

use std::sync::Arc;

use chrono::Utc;

use screener_core::error::CoreError;
use screener_core::leaderboard::LeaderboardEntry;
use screener_core::retry::RetryPolicy;
use screener_core::types::DbId;
use screener_db::models::Job;
use screener_db::repositories::batch_repo::TerminalKind;
use screener_db::repositories::job_repo::Transition;
use screener_db::repositories::{BatchRepo, JobRepo};
use screener_db::DbPool;
use screener_events::{EventBus, StoreEvent};

use crate::aggregator::ResultAggregator;
use crate::error::EngineResult;
use crate::executor::{WorkerCallback, WorkerOutcome};

/// What a reported outcome turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The job completed.
    Completed,
    /// The attempt failed and the job was rescheduled for a retry.
    Rescheduled,
    /// The attempt failed with no retries left; the job is terminally
    /// failed.
    FailedTerminally,
    /// Stale or duplicate report: dropped without any state change.
    Fenced,
}

pub struct StatusStore {
    pool: DbPool,
    bus: Arc<EventBus>,
    aggregator: Arc<ResultAggregator>,
    policy: RetryPolicy,
}

impl StatusStore {
    pub fn new(
        pool: DbPool,
        bus: Arc<EventBus>,
        aggregator: Arc<ResultAggregator>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            pool,
            bus,
            aggregator,
            policy,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn aggregator(&self) -> &Arc<ResultAggregator> {
        &self.aggregator
    }

    /// Fenced: flag a dispatched job as running.
    pub async fn mark_running(&self, job: &Job, attempt_id: &str) -> EngineResult<()> {
        if JobRepo::mark_running(&self.pool, job.id, attempt_id).await? == Transition::Applied {
            self.publish_job(job, "job.running", None);
        }
        Ok(())
    }

    /// Apply an external worker callback by job id and attempt id.
    pub async fn apply_callback(&self, callback: &WorkerCallback) -> EngineResult<Applied> {
        let job = JobRepo::find_by_id(&self.pool, callback.job_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Job",
                id: callback.job_id,
            })?;
        self.apply_outcome(&job, &callback.attempt_id, &callback.outcome)
            .await
    }

    /// Apply one attempt's outcome through the fenced transition path.
    ///
    /// `job` is the row as it looked when the attempt was dispatched; the
    /// compare-and-set re-validates against current state, so a stale
    /// snapshot can at worst be fenced, never misapplied.
    pub async fn apply_outcome(
        &self,
        job: &Job,
        attempt_id: &str,
        outcome: &WorkerOutcome,
    ) -> EngineResult<Applied> {
        match outcome {
            WorkerOutcome::Completed {
                score,
                metrics,
                artifacts,
            } => {
                // The job's terminal flip and the batch counter increment
                // share one transaction; a counter failure unwinds the flip
                // so a retried callback can still repair the batch.
                let mut tx = self.pool.begin().await?;
                let transition =
                    JobRepo::complete(&mut *tx, job.id, attempt_id, *score, metrics, artifacts)
                        .await?;
                if transition == Transition::Fenced {
                    tracing::debug!(job_id = job.id, attempt_id, "Stale completion fenced out");
                    return Ok(Applied::Fenced);
                }
                let update = match job.batch_id {
                    Some(batch_id) => Some(
                        self.aggregator
                            .record_terminal(&mut *tx, batch_id, TerminalKind::Completed)
                            .await?,
                    ),
                    None => None,
                };
                tx.commit().await?;

                self.publish_job(job, "job.completed", Some(serde_json::json!({"score": score})));
                if let (Some(batch_id), Some((counters, status))) = (job.batch_id, update) {
                    self.aggregator
                        .publish_terminal(
                            batch_id,
                            &counters,
                            status,
                            Some(LeaderboardEntry {
                                job_id: job.id,
                                candidate_id: job.candidate_id.clone(),
                                score: *score,
                            }),
                        )
                        .await;
                }
                Ok(Applied::Completed)
            }

            WorkerOutcome::Failed { error } => {
                // attempt_count on the dispatched row already includes the
                // attempt that just failed.
                if self.policy.should_retry(job.attempt_count as u32) {
                    let delay = self.policy.backoff_jittered(job.attempt_count as u32);
                    let next_attempt_at = Utc::now() + chrono::Duration::from_std(delay)
                        .unwrap_or(chrono::Duration::zero());
                    let transition =
                        JobRepo::reschedule(&self.pool, job.id, attempt_id, next_attempt_at)
                            .await?;
                    if transition == Transition::Fenced {
                        tracing::debug!(job_id = job.id, attempt_id, "Stale failure fenced out");
                        return Ok(Applied::Fenced);
                    }

                    tracing::info!(
                        job_id = job.id,
                        attempt = job.attempt_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Dispatch failure, retry scheduled",
                    );
                    self.publish_job(
                        job,
                        "job.retrying",
                        Some(serde_json::json!({"attempt": job.attempt_count, "error": error})),
                    );
                    Ok(Applied::Rescheduled)
                } else {
                    let mut tx = self.pool.begin().await?;
                    let transition = JobRepo::fail(&mut *tx, job.id, attempt_id, error).await?;
                    if transition == Transition::Fenced {
                        tracing::debug!(job_id = job.id, attempt_id, "Stale failure fenced out");
                        return Ok(Applied::Fenced);
                    }
                    let update = match job.batch_id {
                        Some(batch_id) => Some(
                            self.aggregator
                                .record_terminal(&mut *tx, batch_id, TerminalKind::Failed)
                                .await?,
                        ),
                        None => None,
                    };
                    tx.commit().await?;

                    tracing::warn!(
                        job_id = job.id,
                        attempts = job.attempt_count,
                        error = %error,
                        "Job failed terminally, retries exhausted",
                    );
                    self.publish_job(job, "job.failed", Some(serde_json::json!({"error": error})));
                    if let (Some(batch_id), Some((counters, status))) = (job.batch_id, update) {
                        self.aggregator
                            .publish_terminal(batch_id, &counters, status, None)
                            .await;
                    }
                    Ok(Applied::FailedTerminally)
                }
            }
        }
    }

    /// Cancel a batch: all non-terminal jobs move to `cancelled` and no
    /// further dispatch happens for it. In-flight executions keep running;
    /// their late reports are fenced by the now-terminal jobs.
    pub async fn cancel_batch(&self, batch_id: DbId) -> EngineResult<u64> {
        let batch = BatchRepo::find_by_id(&self.pool, batch_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Batch",
                id: batch_id,
            })?;
        if screener_core::status::BatchStatus::from_id(batch.status_id)
            .is_some_and(|s| s.is_terminal())
        {
            return Err(CoreError::Conflict(format!(
                "Batch {batch_id} is already terminal"
            ))
            .into());
        }

        let cancelled = BatchRepo::cancel(&self.pool, batch_id).await?;
        self.aggregator.evict(batch_id).await;
        tracing::info!(batch_id, cancelled, "Batch cancelled");
        self.bus.publish(
            StoreEvent::new("batch.cancelled")
                .with_batch(batch_id)
                .with_payload(serde_json::json!({"cancelled_jobs": cancelled})),
        );
        Ok(cancelled)
    }

    fn publish_job(&self, job: &Job, event_type: &str, payload: Option<serde_json::Value>) {
        let mut event = StoreEvent::new(event_type).with_job(job.id);
        if let Some(batch_id) = job.batch_id {
            event = event.with_batch(batch_id);
        }
        if let Some(payload) = payload {
            event = event.with_payload(payload);
        }
        self.bus.publish(event);
    }
}
