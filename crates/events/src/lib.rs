//! Push-based change notification for the status store.
//!
//! Subscribers receive an event for every document change instead of
//! polling; reconnection/resume is the transport's problem, not ours.

pub mod bus;

pub use bus::{EventBus, StoreEvent};
