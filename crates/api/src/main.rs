use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use screener_api::config::ServerConfig;
use screener_api::router::build_app_router;
use screener_api::state::AppState;
use screener_api::worker::HttpExecutor;
use screener_db::Database;
use screener_engine::aggregator::ResultAggregator;
use screener_engine::queue::DispatchQueue;
use screener_engine::store::StatusStore;
use screener_engine::submit::BatchSubmissionService;
use screener_engine::executor::WorkerExecutor;
use screener_events::EventBus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screener_api=debug,screener_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let db = Database::new(std::path::Path::new(&config.database_path))
        .await
        .with_context(|| format!("failed to open database at {}", config.database_path))?;
    tracing::info!(path = %config.database_path, "Database ready");

    // --- Engine services ---
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

    // --- Dispatch loop ---
    let executor: Arc<dyn WorkerExecutor> = Arc::new(HttpExecutor::new(&config.worker_url));
    let queue = DispatchQueue::new(Arc::clone(&store), executor, config.dispatch_config());
    let shutdown = CancellationToken::new();
    let queue_cancel = shutdown.clone();
    let queue_handle = tokio::spawn(async move { queue.run(queue_cancel).await });
    tracing::info!(worker_url = %config.worker_url, "Dispatch loop started");

    // --- App state / router ---
    let state = AppState {
        pool: db.pool().clone(),
        config: Arc::new(config.clone()),
        event_bus,
        submission,
        store,
    };
    let app = build_app_router(state, &config);

    // --- Serve ---
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid HOST/PORT combination")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Stop the dispatch loop and wait for it to wind down.
    shutdown.cancel();
    if let Err(e) = queue_handle.await {
        tracing::error!(error = %e, "Dispatch loop task panicked");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
