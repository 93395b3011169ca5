//! Redis Streams consumer group for replay export jobs.
//!
//! This crate provides:
//! - Consumer group creation and job intake via XREADGROUP
//! - Crash recovery of unacknowledged entries via XAUTOCLAIM
//! - Progress and result publication via XADD

pub mod error;
pub mod publisher;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use publisher::EventPublisher;
pub use queue::{ClaimBatch, JobQueue, QueueConfig, StreamEntry, CURSOR_START};
