//! Pure domain logic for the batch screening engine.
//!
//! No I/O and no internal dependencies: everything here is constants,
//! types, and functions shared by the store, the dispatch engine, the
//! API, and the client loader.

pub mod aggregate;
pub mod error;
pub mod leaderboard;
pub mod result;
pub mod retry;
pub mod status;
pub mod submission;
pub mod types;
