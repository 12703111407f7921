//! Client-side progressive results loading: a transport seam over the
//! read API, a TTL page cache, and the two-pass light/heavy loader.

pub mod api;
pub mod cache;
pub mod error;
pub mod loader;

pub use api::{BatchSummary, HttpResultsApi, ResultsApi, ResultsPage};
pub use cache::{MemoryCache, PageKey, ResultCache};
pub use error::{ClientError, ClientResult};
pub use loader::{BatchView, LoaderConfig, ProgressiveLoader};
