use std::time::Duration;

use screener_core::retry::RetryPolicy;
use screener_engine::queue::DispatchConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// SQLite database path (default: `screener.db`).
    pub database_path: String,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// External worker endpoint receiving dispatch attempts.
    pub worker_url: String,
    /// Maximum candidates accepted in one submission (default: `1000`).
    pub max_candidates: usize,
    /// Leaderboard size kept per batch (default: `20`).
    pub leaderboard_size: usize,
    /// Dispatcher poll interval in milliseconds (default: `250`).
    pub poll_interval_ms: u64,
    /// Per-attempt execution timeout in seconds (default: `300`).
    pub job_timeout_secs: u64,
    /// Dispatch rate cap, claims per second (default: `50`).
    pub max_dispatch_per_sec: u32,
    /// Optional global in-flight cap across all batches (default: off).
    pub global_max_in_flight: Option<usize>,
    /// Maximum execution attempts per job (default: `3`).
    pub retry_max_attempts: u32,
    /// Base retry backoff in milliseconds (default: `500`).
    pub retry_base_delay_ms: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `3000`                  |
    /// | `DATABASE_PATH`         | `screener.db`           |
    /// | `CORS_ORIGINS`          | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
    /// | `WORKER_URL`            | `http://localhost:8188` |
    /// | `MAX_CANDIDATES`        | `1000`                  |
    /// | `LEADERBOARD_SIZE`      | `20`                    |
    /// | `POLL_INTERVAL_MS`      | `250`                   |
    /// | `JOB_TIMEOUT_SECS`      | `300`                   |
    /// | `MAX_DISPATCH_PER_SEC`  | `50`                    |
    /// | `GLOBAL_MAX_IN_FLIGHT`  | unset (no global cap)   |
    /// | `RETRY_MAX_ATTEMPTS`    | `3`                     |
    /// | `RETRY_BASE_DELAY_MS`   | `500`                   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "screener.db".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_parsed("REQUEST_TIMEOUT_SECS", 30);

        let worker_url =
            std::env::var("WORKER_URL").unwrap_or_else(|_| "http://localhost:8188".into());

        Self {
            host,
            port,
            database_path,
            cors_origins,
            request_timeout_secs,
            worker_url,
            max_candidates: env_parsed("MAX_CANDIDATES", 1_000),
            leaderboard_size: env_parsed("LEADERBOARD_SIZE", 20),
            poll_interval_ms: env_parsed("POLL_INTERVAL_MS", 250),
            job_timeout_secs: env_parsed("JOB_TIMEOUT_SECS", 300),
            max_dispatch_per_sec: env_parsed("MAX_DISPATCH_PER_SEC", 50),
            global_max_in_flight: std::env::var("GLOBAL_MAX_IN_FLIGHT")
                .ok()
                .map(|v| v.parse().expect("GLOBAL_MAX_IN_FLIGHT must be a valid usize")),
            retry_max_attempts: env_parsed("RETRY_MAX_ATTEMPTS", 3),
            retry_base_delay_ms: env_parsed("RETRY_BASE_DELAY_MS", 500),
        }
    }

    /// Dispatcher configuration derived from the engine knobs.
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            job_timeout: Duration::from_secs(self.job_timeout_secs),
            max_dispatch_per_sec: self.max_dispatch_per_sec,
            global_max_in_flight: self.global_max_in_flight,
        }
    }

    /// Retry policy derived from the engine knobs.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..RetryPolicy::default()
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T
where
    T::Err: std::fmt::Debug,
{
    match std::env::var(name) {
        Ok(v) => v.parse().unwrap_or_else(|e| {
            panic!("{name} must be a valid value: {e:?}");
        }),
        Err(_) => default,
    }
}
