//! HTTP surface of the screening engine: batch submission, summary and
//! paginated results reads, cancellation, and the worker callback.

pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod worker;
