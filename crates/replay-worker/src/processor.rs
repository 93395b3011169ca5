//! Request processing: one entry in, exactly one result out.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{info, warn, Instrument};

use replay_media::{
    EncoderCapabilities, EncoderProfile, ExportRoot, FfmpegEncoder, Rasterizer, VideoEncoder,
};
use replay_models::{ErrorCode, ExportJob, JobKind, JobResult, Phase, ProgressEvent, RequestError};

use crate::config::WorkerConfig;
use crate::error::{ExportError, WorkerResult};
use crate::export::{export_thumbnail, export_video, Artifact};
use crate::logging::JobLogger;
use crate::metrics;
use crate::reporter::JobReporter;

const ACCEPTED_PERCENT: u8 = 10;

/// Long-lived state shared by every job this worker runs.
pub struct ProcessingContext {
    pub export_root: ExportRoot,
    pub capabilities: EncoderCapabilities,
    pub hw_accel_enabled: bool,
    pub encoder: Arc<dyn VideoEncoder>,
    pub rasterizer: Rasterizer,
    /// Distinguishes this worker's temporary files from a peer's working on the same job
    pub worker_id: String,
}

impl ProcessingContext {
    /// Create the export root and probe the encoder once.
    pub async fn new(config: &WorkerConfig, worker_id: &str) -> WorkerResult<Self> {
        let export_root = ExportRoot::new(&config.export_root).await?;
        info!("Export root: {}", export_root.path().display());

        let capabilities = EncoderCapabilities::probe(&config.ffmpeg_bin).await;
        if config.hw_accel_enabled && capabilities.selected_hw_encoder().is_none() {
            info!("Hardware encoding enabled but no hardware encoder found, using libx264");
        }

        Ok(Self::with_encoder(
            export_root,
            capabilities,
            config.hw_accel_enabled,
            Arc::new(FfmpegEncoder::new(config.ffmpeg_bin.clone())),
            worker_id,
        ))
    }

    pub fn with_encoder(
        export_root: ExportRoot,
        capabilities: EncoderCapabilities,
        hw_accel_enabled: bool,
        encoder: Arc<dyn VideoEncoder>,
        worker_id: &str,
    ) -> Self {
        Self {
            export_root,
            capabilities,
            hw_accel_enabled,
            encoder,
            rasterizer: Rasterizer::new(),
            worker_id: worker_id.to_string(),
        }
    }

    /// Hardware profile to try first, when enabled and available.
    pub fn hw_profile(&self) -> Option<&EncoderProfile> {
        if self.hw_accel_enabled {
            self.capabilities.selected_hw_encoder()
        } else {
            None
        }
    }
}

/// Process one request entry.
///
/// Returns the published result, or `None` when the entry carried no job ID
/// and there is nobody to answer.
pub async fn process_request(
    ctx: &ProcessingContext,
    reporter: &dyn JobReporter,
    fields: HashMap<String, String>,
) -> Option<JobResult> {
    match ExportJob::from_fields(fields) {
        Ok(job) => Some(process_job(ctx, reporter, &job).await),
        Err(RequestError::MissingJobId) => {
            warn!("Dropping request without jobId");
            metrics::record_dropped("missing_job_id");
            None
        }
        Err(err) => {
            let job_id = err.job_id()?.clone();
            warn!(job_id = %job_id, "Rejecting request: {}", err);
            reporter
                .progress(ProgressEvent::new(
                    job_id.clone(),
                    ACCEPTED_PERCENT,
                    Phase::Queue,
                    "accepted",
                ))
                .await;
            let result = JobResult::failed(job_id, ErrorCode::UnsupportedType, err.to_string());
            reporter.result(result.clone()).await;
            metrics::record_job("unknown", result.status.as_str(), std::time::Duration::ZERO);
            Some(result)
        }
    }
}

/// Run an accepted job and publish its single result.
pub async fn process_job(
    ctx: &ProcessingContext,
    reporter: &dyn JobReporter,
    job: &ExportJob,
) -> JobResult {
    let logger = JobLogger::for_job(job);
    let span = logger.create_span();
    let started = Instant::now();

    async {
        logger.log_start(&format!("replay {}", job.replay_id));
        reporter
            .progress(ProgressEvent::new(
                job.job_id.clone(),
                ACCEPTED_PERCENT,
                Phase::Queue,
                "accepted",
            ))
            .await;

        let outcome = AssertUnwindSafe(dispatch(ctx, job, reporter, &logger))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ExportError::unexpected(
                    format!("worker panicked: {}", panic_message(panic.as_ref())),
                    false,
                ))
            });

        let result = match outcome {
            Ok(artifact) => {
                logger.log_completion(&format!(
                    "{} (sha256 {})",
                    artifact.path.display(),
                    artifact.checksum
                ));
                JobResult::succeeded(
                    job.job_id.clone(),
                    artifact.path.display().to_string(),
                    artifact.checksum,
                )
            }
            Err(err) => {
                logger.log_error(&format!("{}: {}", err.code(), err));
                JobResult::failed(job.job_id.clone(), err.code(), err.to_string())
            }
        };

        reporter.result(result.clone()).await;
        metrics::record_job(job.kind.as_str(), result.status.as_str(), started.elapsed());
        result
    }
    .instrument(span)
    .await
}

async fn dispatch(
    ctx: &ProcessingContext,
    job: &ExportJob,
    reporter: &dyn JobReporter,
    logger: &JobLogger,
) -> Result<Artifact, ExportError> {
    match job.kind {
        JobKind::ExportVideo => export_video(ctx, job, reporter, logger).await,
        JobKind::ExportThumbnail => export_thumbnail(ctx, job, reporter, logger).await,
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::RecordingReporter;
    use crate::test_support::{context, replay_file, FakeEncoder};
    use replay_models::JobStatus;
    use tempfile::TempDir;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_video_request_yields_one_success() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeEncoder::default()), None, false).await;
        let input = replay_file(dir.path(), &[0, 500]).await;
        let output = ctx.export_root.path().join("v.mp4");
        let reporter = RecordingReporter::new();

        let result = process_request(
            &ctx,
            &reporter,
            fields(&[
                ("jobId", "7"),
                ("jobType", "REPLAY_EXPORT_MP4"),
                ("replayId", "r7"),
                ("inputPath", input.to_str().unwrap()),
                ("outputPath", output.to_str().unwrap()),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(result.status, JobStatus::Succeeded);
        assert_eq!(result.result_uri.as_deref(), output.to_str());
        assert_eq!(reporter.results(), vec![result]);
        let first = &reporter.progress_events()[0];
        assert_eq!((first.phase, first.progress), (Phase::Queue, 10));
    }

    #[tokio::test]
    async fn test_hardware_fallback_success_has_no_hardware_code() {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(FakeEncoder::failing(&["h264_nvenc"]));
        let ctx = context(dir.path(), encoder.clone(), Some("h264_nvenc"), true).await;
        let input = replay_file(dir.path(), &[0, 500]).await;
        let output = ctx.export_root.path().join("hw.mp4");
        let reporter = RecordingReporter::new();

        let result = process_request(
            &ctx,
            &reporter,
            fields(&[
                ("jobId", "12"),
                ("jobType", "REPLAY_EXPORT_MP4"),
                ("inputPath", input.to_str().unwrap()),
                ("outputPath", output.to_str().unwrap()),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(encoder.attempts(), vec!["h264_nvenc", "libx264"]);
        assert_eq!(result.status, JobStatus::Succeeded);
        assert!(!result.error_code.is_some_and(|c| c.is_hardware_tagged()));
        assert!(reporter.results().iter().all(|r| r.error_code.is_none()));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(FakeEncoder::default());
        let ctx = context(dir.path(), encoder.clone(), None, false).await;
        let reporter = RecordingReporter::new();

        let result = process_request(
            &ctx,
            &reporter,
            fields(&[("jobId", "8"), ("jobType", "REPLAY_EXPORT_GIF")]),
        )
        .await
        .unwrap();

        assert_eq!(result.error_code, Some(ErrorCode::UnsupportedType));
        assert!(encoder.attempts().is_empty());
        assert_eq!(reporter.results().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_job_type_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeEncoder::default()), None, false).await;
        let reporter = RecordingReporter::new();

        let result = process_request(&ctx, &reporter, fields(&[("jobId", "9")]))
            .await
            .unwrap();
        assert_eq!(result.error_code, Some(ErrorCode::UnsupportedType));
    }

    #[tokio::test]
    async fn test_missing_job_id_is_dropped() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeEncoder::default()), None, false).await;
        let reporter = RecordingReporter::new();

        let result = process_request(
            &ctx,
            &reporter,
            fields(&[("jobType", "REPLAY_THUMBNAIL")]),
        )
        .await;

        assert!(result.is_none());
        assert!(reporter.results().is_empty());
        assert!(reporter.progress_events().is_empty());
    }

    #[tokio::test]
    async fn test_panic_becomes_worker_error() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeEncoder::panicking(&["libx264"])), None, false).await;
        let input = replay_file(dir.path(), &[0]).await;
        let output = ctx.export_root.path().join("p.mp4");
        let reporter = RecordingReporter::new();

        let result = process_request(
            &ctx,
            &reporter,
            fields(&[
                ("jobId", "10"),
                ("jobType", "EXPORT_VIDEO"),
                ("inputPath", input.to_str().unwrap()),
                ("outputPath", output.to_str().unwrap()),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(result.error_code, Some(ErrorCode::WorkerError));
        assert!(result.error_message.unwrap().contains("fake encoder panicked"));
        assert_eq!(reporter.results().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_result_carries_code_and_message() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeEncoder::default()), None, false).await;
        let reporter = RecordingReporter::new();

        let result = process_request(
            &ctx,
            &reporter,
            fields(&[
                ("jobId", "11"),
                ("jobType", "REPLAY_THUMBNAIL"),
                ("inputPath", "/nonexistent/replay.jsonl"),
                ("outputPath", "/etc/t.png"),
            ]),
        )
        .await
        .unwrap();

        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(result.error_code, Some(ErrorCode::InvalidOutputPath));
        assert!(result.result_uri.is_none());
    }
}
