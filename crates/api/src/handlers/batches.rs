//! Handlers for the `/batches` resource: submission, summary, paginated
//! results, cancellation.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use screener_core::error::CoreError;
use screener_core::leaderboard::LeaderboardEntry;
use screener_core::submission::SubmitBatch;
use screener_core::types::DbId;
use screener_db::models::job::ResultsPageQuery;
use screener_db::models::{Batch, JobRecord};
use screener_db::repositories::{BatchRepo, JobRepo};

use crate::error::{AppError, AppResult};
use crate::response::{DataResponse, PerfMeta, TimedResponse};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_batch(state: &AppState, batch_id: DbId) -> AppResult<Batch> {
    state
        .submission
        .find(batch_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Batch",
            id: batch_id,
        }))
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/batches
///
/// Submit a batch of candidate evaluations. Returns 201 with the created
/// batch; jobs start `queued` and are picked up by the dispatch loop.
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(input): Json<SubmitBatch>,
) -> AppResult<impl IntoResponse> {
    let batch = state.submission.submit(input).await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: batch })))
}

// ---------------------------------------------------------------------------
// List / get
// ---------------------------------------------------------------------------

/// GET /api/v1/batches
///
/// Most recent batches first, capped at 100 rows.
pub async fn list_batches(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let batches = BatchRepo::list(&state.pool, 100).await?;
    Ok(Json(DataResponse { data: batches }))
}

/// Summary payload: the precomputed aggregate row plus the current
/// leaderboard snapshot. Counters never come from a job scan; for
/// terminal batches the leaderboard is a bounded top-K score read.
#[derive(Debug, Serialize)]
pub struct BatchSummary {
    #[serde(flatten)]
    pub batch: Batch,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// GET /api/v1/batches/{id}/summary
///
/// Constant-time in batch size: serves the counter columns maintained by
/// atomic increments, never a scan over jobs.
pub async fn batch_summary(
    State(state): State<AppState>,
    Path(batch_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let start = Instant::now();
    let batch = find_batch(&state, batch_id).await?;
    let leaderboard = state.store.aggregator().leaderboard(batch_id).await?;

    Ok(Json(TimedResponse {
        data: BatchSummary { batch, leaderboard },
        meta: PerfMeta::since(start),
    }))
}

// ---------------------------------------------------------------------------
// Results pages
// ---------------------------------------------------------------------------

/// One page of results in stable creation order.
#[derive(Debug, Serialize)]
pub struct ResultsPage {
    pub batch_id: DbId,
    pub page: i64,
    pub page_size: i64,
    pub jobs: Vec<JobRecord>,
}

/// GET /api/v1/batches/{id}/results?page&page_size&include_heavy
///
/// Pages are ordered by `(created_at, id)` so repeated reads of the same
/// page return identical rows. Light pages omit artifacts; heavy pages are
/// a strict superset.
pub async fn batch_results(
    State(state): State<AppState>,
    Path(batch_id): Path<DbId>,
    Query(query): Query<ResultsPageQuery>,
) -> AppResult<impl IntoResponse> {
    let start = Instant::now();
    find_batch(&state, batch_id).await?;

    let jobs = JobRepo::results_page(
        &state.pool,
        batch_id,
        query.page(),
        query.page_size(),
        query.include_heavy(),
    )
    .await?;

    let page = ResultsPage {
        batch_id,
        page: query.page(),
        page_size: query.page_size(),
        jobs: jobs.iter().map(JobRecord::from).collect(),
    };

    Ok(Json(TimedResponse {
        data: page,
        meta: PerfMeta::since(start),
    }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/batches/{id}/cancel
///
/// Moves every non-terminal job to `cancelled` and halts further dispatch
/// for the batch. In-flight worker executions are not interrupted; their
/// late callbacks are fenced. Returns 409 if the batch is already terminal.
pub async fn cancel_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancelled = state.store.cancel_batch(batch_id).await?;

    tracing::info!(batch_id, cancelled, "Batch cancelled");

    Ok(Json(DataResponse {
        data: serde_json::json!({ "batch_id": batch_id, "cancelled_jobs": cancelled }),
    }))
}
