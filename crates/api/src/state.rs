use std::sync::Arc;

use screener_db::DbPool;
use screener_engine::store::StatusStore;
use screener_engine::submit::BatchSubmissionService;
use screener_events::EventBus;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Event bus publishing store transitions to subscribers.
    pub event_bus: Arc<EventBus>,
    /// Batch submission service (validation + atomic creation).
    pub submission: Arc<BatchSubmissionService>,
    /// Fenced transition store; also holds the aggregator and leaderboards.
    pub store: Arc<StatusStore>,
}
