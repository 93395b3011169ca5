//! Shared data models for the replay export worker.
//!
//! This crate provides Serde-serializable types for:
//! - Export jobs as carried on the request stream
//! - Replay snapshots and event sequences
//! - Progress and result events
//! - Render and encoding constants

pub mod encoding;
pub mod events;
pub mod job;
pub mod replay;

// Re-export common types
pub use events::{ErrorCode, JobResult, JobStatus, Phase, ProgressEvent};
pub use job::{ExportJob, JobId, JobKind, RequestError};
pub use replay::{ReplayEvent, ReplaySequence, Snapshot};
