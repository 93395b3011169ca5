//! Replay export worker.
//!
//! This crate provides:
//! - Job intake and crash recovery over a Redis Streams consumer group
//! - MP4 export with hardware-first encoding and software fallback
//! - PNG thumbnail export
//! - Progress and result publication
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod export;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod replay_loader;
pub mod reporter;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::WorkerConfig;
pub use error::{ExportError, WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use export::Artifact;
pub use logging::JobLogger;
pub use processor::{process_job, process_request, ProcessingContext};
pub use reporter::{JobReporter, RecordingReporter, StreamReporter};
