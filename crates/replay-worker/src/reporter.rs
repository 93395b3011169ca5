//! Where progress and result events go.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::warn;

use replay_models::{JobResult, ProgressEvent};
use replay_queue::EventPublisher;

/// Sink for job events.
///
/// Reporting is best effort: a failure to deliver an event is logged and
/// never changes the outcome of the job.
#[async_trait]
pub trait JobReporter: Send + Sync {
    async fn progress(&self, event: ProgressEvent);
    async fn result(&self, result: JobResult);
}

/// Publishes events to the progress and result streams.
pub struct StreamReporter {
    publisher: EventPublisher,
}

impl StreamReporter {
    pub fn new(publisher: EventPublisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl JobReporter for StreamReporter {
    async fn progress(&self, event: ProgressEvent) {
        if let Err(e) = self.publisher.publish_progress(&event).await {
            warn!(job_id = %event.job_id, "Failed to publish progress: {}", e);
        }
    }

    async fn result(&self, result: JobResult) {
        if let Err(e) = self.publisher.publish_result(&result).await {
            warn!(
                job_id = %result.job_id,
                status = %result.status,
                "Failed to publish result: {}", e
            );
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    progress: Mutex<Vec<ProgressEvent>>,
    results: Mutex<Vec<JobResult>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress_events(&self) -> Vec<ProgressEvent> {
        self.progress.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn results(&self) -> Vec<JobResult> {
        self.results.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl JobReporter for RecordingReporter {
    async fn progress(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.progress.lock() {
            events.push(event);
        }
    }

    async fn result(&self, result: JobResult) {
        if let Ok(mut results) = self.results.lock() {
            results.push(result);
        }
    }
}
