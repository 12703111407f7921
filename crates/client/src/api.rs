//! Read-API transport: wire DTOs and the [`ResultsApi`] seam.
//!
//! The loader talks to the server only through [`ResultsApi`], so tests
//! substitute scripted transports and the cache layer stays independent of
//! the HTTP stack.

use async_trait::async_trait;
use serde::Deserialize;

use screener_core::leaderboard::LeaderboardEntry;
use screener_core::status::{BatchStatus, StatusId};
use screener_core::types::DbId;
use screener_db::models::JobRecord;

use crate::error::{ClientError, ClientResult};

/// Summary payload from `GET /api/v1/batches/{id}/summary`.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSummary {
    pub id: DbId,
    pub name: String,
    pub status_id: StatusId,
    pub total_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub cancelled_jobs: i64,
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl BatchSummary {
    pub fn status(&self) -> Option<BatchStatus> {
        BatchStatus::from_id(self.status_id)
    }

    /// Number of pages a full read takes at the given page size. A
    /// non-positive page size is treated as 1.
    pub fn total_pages(&self, page_size: i64) -> i64 {
        let page_size = page_size.max(1);
        if self.total_jobs == 0 {
            0
        } else {
            (self.total_jobs + page_size - 1) / page_size
        }
    }
}

/// One results page from `GET /api/v1/batches/{id}/results`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsPage {
    pub batch_id: DbId,
    pub page: i64,
    pub page_size: i64,
    pub jobs: Vec<JobRecord>,
}

/// The `{ data, meta }` envelope around read responses.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Transport seam for the read API.
#[async_trait]
pub trait ResultsApi: Send + Sync {
    async fn summary(&self, batch_id: DbId) -> ClientResult<BatchSummary>;

    async fn results_page(
        &self,
        batch_id: DbId,
        page: i64,
        page_size: i64,
        include_heavy: bool,
    ) -> ClientResult<ResultsPage>;
}

/// HTTP implementation over reqwest.
pub struct HttpResultsApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpResultsApi {
    /// `base_url` is the server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> ClientResult<T> {
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }
        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl ResultsApi for HttpResultsApi {
    async fn summary(&self, batch_id: DbId) -> ClientResult<BatchSummary> {
        self.get_json(format!(
            "{}/api/v1/batches/{batch_id}/summary",
            self.base_url
        ))
        .await
    }

    async fn results_page(
        &self,
        batch_id: DbId,
        page: i64,
        page_size: i64,
        include_heavy: bool,
    ) -> ClientResult<ResultsPage> {
        self.get_json(format!(
            "{}/api/v1/batches/{batch_id}/results?page={page}&page_size={page_size}&include_heavy={include_heavy}",
            self.base_url
        ))
        .await
    }
}
