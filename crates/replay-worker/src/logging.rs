//! Structured job logging utilities.
//!
//! Every line carries the job ID and the job kind so a single export can be
//! followed through the worker's output.

use tracing::{error, info, warn, Span};

use replay_models::{ExportJob, JobId};

/// Per-job logger with consistent fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    /// Logger for an accepted job; the operation is the job kind.
    pub fn for_job(job: &ExportJob) -> Self {
        Self::new(&job.job_id, job.kind.as_str())
    }

    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span wrapping everything done for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_models::JobKind;

    #[test]
    fn test_logger_for_job() {
        let job = ExportJob::new(JobId::from_string("job-5"), JobKind::ExportThumbnail, "r");
        let logger = JobLogger::for_job(&job);

        assert_eq!(logger.job_id(), "job-5");
        assert_eq!(logger.operation(), "REPLAY_THUMBNAIL");
    }
}
