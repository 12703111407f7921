//! HTTP transport to the external worker pool.
//!
//! The dispatcher hands each claimed attempt to a [`WorkerExecutor`]; this
//! implementation POSTs the attempt to the configured worker endpoint and
//! interprets the JSON reply as a [`WorkerOutcome`]. Transport failures are
//! reported as failed attempts and go through the normal retry policy.
//! Workers that reply out of band instead use `POST /api/v1/workers/callback`;
//! the fencing check in the store deduplicates the two paths.

use async_trait::async_trait;
use screener_core::types::DbId;
use screener_engine::executor::{WorkerExecutor, WorkerOutcome};
use serde::Serialize;

/// One dispatch attempt on the wire.
#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    job_id: DbId,
    candidate: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a serde_json::Value>,
}

pub struct HttpExecutor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExecutor {
    /// `worker_url` is the base URL of the worker pool; attempts are POSTed
    /// to `{worker_url}/execute`.
    pub fn new(worker_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/execute", worker_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl WorkerExecutor for HttpExecutor {
    async fn execute(
        &self,
        job_id: DbId,
        candidate: &serde_json::Value,
        target: Option<&serde_json::Value>,
    ) -> WorkerOutcome {
        let request = DispatchRequest {
            job_id,
            candidate,
            target,
        };

        let response = match self.client.post(&self.endpoint).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Worker request failed");
                return WorkerOutcome::Failed {
                    error: format!("worker request failed: {e}"),
                };
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(job_id, %status, "Worker returned an error status");
            return WorkerOutcome::Failed {
                error: format!("worker returned status {status}"),
            };
        }

        match response.json::<WorkerOutcome>().await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Worker reply was not a valid outcome");
                WorkerOutcome::Failed {
                    error: format!("invalid worker reply: {e}"),
                }
            }
        }
    }
}
