//! Route definitions for the `/workers` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::workers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/callback", post(workers::worker_callback))
}
