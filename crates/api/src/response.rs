//! Shared response envelope types for API handlers.
//!
//! All API responses use a `{ "data": ... }` envelope. Read endpoints that
//! feed the progressive loader additionally carry a `meta` block with
//! timing information so clients can surface slow pages.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Performance metadata attached to summary and results-page responses.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PerfMeta {
    /// Server-side handling time in milliseconds.
    pub response_time_ms: u64,
    /// Whether the response was served from a cache. Always `false` on the
    /// server side; the client-side cache rewrites this on hits.
    pub cache_hit: bool,
}

impl PerfMeta {
    pub fn since(start: std::time::Instant) -> Self {
        Self {
            response_time_ms: start.elapsed().as_millis() as u64,
            cache_hit: false,
        }
    }
}

/// `{ "data": T, "meta": PerfMeta }` envelope for the read endpoints.
#[derive(Debug, Serialize)]
pub struct TimedResponse<T: Serialize> {
    pub data: T,
    pub meta: PerfMeta,
}
