//! Job entity model and page DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use screener_core::result::{HeavyResult, LightResult, ResultPayload};
use screener_core::status::{JobStatus, StatusId};
use screener_core::types::{DbId, Timestamp};

/// A row from the `jobs` table.
///
/// `attempt_id` is the fencing token for the currently active dispatch
/// attempt; it is NULL while the job is queued. `artifacts` is loaded as
/// NULL by light page queries even when the column is populated.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub batch_id: Option<DbId>,
    pub candidate_id: String,
    pub candidate: serde_json::Value,
    pub status_id: StatusId,
    pub attempt_count: i64,
    pub attempt_id: Option<String>,
    pub next_attempt_at: Option<Timestamp>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub score: Option<f64>,
    pub artifacts: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub dispatched_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Job {
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }

    /// Assemble the tagged result payload for a completed job.
    ///
    /// Returns `None` unless the job is completed. The heavy variant is
    /// produced only when the artifacts column was actually loaded.
    pub fn result_payload(&self) -> Option<ResultPayload> {
        if self.status() != Some(JobStatus::Completed) {
            return None;
        }
        let score = self.score?;
        let metrics = self.result.clone().unwrap_or(serde_json::Value::Null);
        match &self.artifacts {
            Some(artifacts) => Some(ResultPayload::Heavy(HeavyResult {
                score,
                metrics,
                artifacts: artifacts.clone(),
            })),
            None => Some(ResultPayload::Light(LightResult { score, metrics })),
        }
    }
}

/// Wire shape of one job on a results page.
///
/// Light pages omit `result.artifacts`; heavy pages carry it. A heavy
/// record is a strict field superset of the light record for the same job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: DbId,
    pub candidate_id: String,
    pub status: JobStatus,
    pub attempt_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultPayload>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl From<&Job> for JobRecord {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            candidate_id: job.candidate_id.clone(),
            status: job.status().unwrap_or(JobStatus::Queued),
            attempt_count: job.attempt_count,
            error: job.error.clone(),
            result: job.result_payload(),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Query parameters for a results page.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResultsPageQuery {
    /// 1-based page number. Defaults to 1.
    pub page: Option<i64>,
    /// Rows per page. Defaults to 50, capped at 200.
    pub page_size: Option<i64>,
    /// Include the large artifact payload. Defaults to false.
    pub include_heavy: Option<bool>,
}

/// Default rows per results page.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Hard cap on rows per results page.
pub const MAX_PAGE_SIZE: i64 = 200;

impl ResultsPageQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn include_heavy(&self) -> bool {
        self.include_heavy.unwrap_or(false)
    }
}
