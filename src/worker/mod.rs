//! Background job execution.
//!
//! - `queue`: in-memory FIFO queue with bounded concurrency and an error hook

pub mod queue;

pub use queue::{ErrorHook, JobQueue, JobWorker};
