//! Route definitions for the `/batches` resource.
//!
//! ```text
//! GET    /                -> list_batches
//! POST   /                -> submit_batch
//! GET    /{id}/summary    -> batch_summary
//! GET    /{id}/results    -> batch_results
//! POST   /{id}/cancel     -> cancel_batch
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::batches;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(batches::list_batches).post(batches::submit_batch))
        .route("/{id}/summary", get(batches::batch_summary))
        .route("/{id}/results", get(batches::batch_results))
        .route("/{id}/cancel", post(batches::cancel_batch))
}
