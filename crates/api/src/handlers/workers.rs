//! Worker completion callback handler.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use screener_engine::executor::WorkerCallback;
use screener_engine::store::Applied;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/workers/callback
///
/// Out-of-band completion report from a worker. Routed through the fenced
/// transition: a stale or duplicate report is acknowledged with
/// `"fenced"` and changes nothing. Unknown job ids return 404.
pub async fn worker_callback(
    State(state): State<AppState>,
    Json(callback): Json<WorkerCallback>,
) -> AppResult<impl IntoResponse> {
    let applied = state.store.apply_callback(&callback).await?;

    let disposition = match applied {
        Applied::Completed => "completed",
        Applied::Rescheduled => "rescheduled",
        Applied::FailedTerminally => "failed",
        Applied::Fenced => "fenced",
    };

    Ok(Json(DataResponse {
        data: serde_json::json!({
            "job_id": callback.job_id,
            "disposition": disposition,
        }),
    }))
}
