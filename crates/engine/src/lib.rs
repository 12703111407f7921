//! Batch orchestration engine: submission, dispatch, status transitions,
//! and aggregation.
//!
//! The engine owns no HTTP surface. It is wired together by the API
//! binary: a [`submit::BatchSubmissionService`] creates work, the
//! [`queue::DispatchQueue`] background loop drives it through a
//! [`executor::WorkerExecutor`], and every transition flows through the
//! [`store::StatusStore`] so fencing, counters, and change notifications
//! stay consistent no matter who reports an outcome.

pub mod aggregator;
pub mod error;
pub mod executor;
pub mod queue;
pub mod store;
pub mod submit;

pub use error::EngineError;
