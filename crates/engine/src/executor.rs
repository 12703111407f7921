//! The worker seam: one opaque execution per dispatch attempt.
//!
//! The engine never looks inside the compute. It hands a candidate and the
//! batch target to a [`WorkerExecutor`] and gets back exactly one
//! [`WorkerOutcome`] per attempt; everything else (retry, fencing,
//! aggregation) happens on the orchestration side.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use screener_core::types::DbId;

/// Result of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerOutcome {
    /// The candidate was evaluated; `metrics` is the small result body and
    /// `artifacts` the heavy payload.
    Completed {
        score: f64,
        metrics: serde_json::Value,
        artifacts: serde_json::Value,
    },
    /// The attempt failed. Failures are treated as transient and retried
    /// under the engine's backoff policy until the attempt cap.
    Failed { error: String },
}

/// Completion callback as reported by an external worker. At most one
/// callback per attempt is honored; the rest are fenced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerCallback {
    pub job_id: DbId,
    pub attempt_id: String,
    #[serde(flatten)]
    pub outcome: WorkerOutcome,
}

/// Executes one job per call. Implementations must report each attempt's
/// outcome exactly once (returning it is enough; the engine applies it
/// through the fenced transition path).
#[async_trait]
pub trait WorkerExecutor: Send + Sync {
    /// Evaluate `candidate` against `target`. `target` is `None` for
    /// standalone jobs whose descriptor is self-contained.
    async fn execute(
        &self,
        job_id: DbId,
        candidate: &serde_json::Value,
        target: Option<&serde_json::Value>,
    ) -> WorkerOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_wire_shape_is_tagged_by_status() {
        let callback = WorkerCallback {
            job_id: 7,
            attempt_id: "a-1".to_string(),
            outcome: WorkerOutcome::Completed {
                score: 0.8,
                metrics: serde_json::json!({"rmsd": 0.4}),
                artifacts: serde_json::json!({"pose": "blob"}),
            },
        };
        let value = serde_json::to_value(&callback).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["job_id"], 7);
        assert_eq!(value["attempt_id"], "a-1");

        let parsed: WorkerCallback = serde_json::from_value(serde_json::json!({
            "job_id": 9,
            "attempt_id": "a-2",
            "status": "failed",
            "error": "no convergence",
        }))
        .unwrap();
        match parsed.outcome {
            WorkerOutcome::Failed { error } => assert_eq!(error, "no convergence"),
            other => panic!("expected failure outcome, got {other:?}"),
        }
    }
}
