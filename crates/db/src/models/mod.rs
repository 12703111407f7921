pub mod batch;
pub mod job;

pub use batch::Batch;
pub use job::{Job, JobRecord};
