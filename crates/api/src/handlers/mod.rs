pub mod batches;
pub mod health;
pub mod workers;
