//! Shared helpers for HTTP-level integration tests.
//!
//! Builds the full application router over an in-memory database so tests
//! exercise the same middleware stack production uses, without a TCP
//! listener.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use screener_api::config::ServerConfig;
use screener_api::router::build_app_router;
use screener_api::state::AppState;
use screener_db::{Database, DbPool};
use screener_engine::aggregator::ResultAggregator;
use screener_engine::store::StatusStore;
use screener_engine::submit::BatchSubmissionService;
use screener_events::EventBus;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: ":memory:".to_string(),
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        worker_url: "http://localhost:8188".to_string(),
        max_candidates: 1_000,
        leaderboard_size: 20,
        poll_interval_ms: 250,
        job_timeout_secs: 300,
        max_dispatch_per_sec: 50,
        global_max_in_flight: None,
        retry_max_attempts: 3,
        retry_base_delay_ms: 500,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    db: Database,
}

impl TestApp {
    pub fn pool(&self) -> &DbPool {
        self.db.pool()
    }

    /// Fresh router clone for a single `oneshot` call.
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

/// Build the full application over a fresh in-memory database.
///
/// No dispatch loop is started; tests drive claims and callbacks directly
/// where they need in-flight jobs.
pub async fn build_test_app() -> TestApp {
    let config = test_config();
    let db = Database::new_in_memory().await.unwrap();

    let event_bus = Arc::new(EventBus::default());
    let aggregator = Arc::new(ResultAggregator::new(
        db.pool().clone(),
        Arc::clone(&event_bus),
        config.leaderboard_size,
    ));
    let store = Arc::new(StatusStore::new(
        db.pool().clone(),
        Arc::clone(&event_bus),
        aggregator,
        config.retry_policy(),
    ));
    let submission = Arc::new(BatchSubmissionService::new(
        db.pool().clone(),
        Arc::clone(&event_bus),
        config.max_candidates,
    ));

    let state = AppState {
        pool: db.pool().clone(),
        config: Arc::new(config.clone()),
        event_bus,
        submission,
        store,
    };
    let router = build_app_router(state.clone(), &config);

    TestApp { router, state, db }
}

/// Send a GET request to the router.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Send a POST request with a JSON body to the router.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
