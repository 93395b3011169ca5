//! PNG thumbnail export of the replay's midpoint snapshot.

use replay_media::{publish_atomically, write_thumbnail, ArtifactFormat};
use replay_models::{ExportJob, Phase, ProgressEvent};

use super::{prepare, Artifact, Prepared};
use crate::error::ExportError;
use crate::logging::JobLogger;
use crate::processor::ProcessingContext;
use crate::reporter::JobReporter;

/// Render the snapshot at index `len / 2` into a PNG at the job's output path.
pub async fn export_thumbnail(
    ctx: &ProcessingContext,
    job: &ExportJob,
    reporter: &dyn JobReporter,
    logger: &JobLogger,
) -> Result<Artifact, ExportError> {
    let (target, sequence) = match prepare(ctx, job, ArtifactFormat::Png, logger).await? {
        Prepared::Existing(artifact) => return Ok(artifact),
        Prepared::Fresh { target, sequence } => (target, sequence),
    };

    let pivot = sequence.midpoint();
    logger.log_progress(&format!(
        "rendering thumbnail at offset {} ms",
        pivot.offset_ms
    ));

    if let Err(e) = write_thumbnail(&ctx.rasterizer, &pivot.snapshot, &target.temp).await {
        target.discard(false).await;
        return Err(ExportError::unexpected(e.to_string(), false));
    }
    if let Err(e) = publish_atomically(&target.temp, &target.output).await {
        target.discard(false).await;
        return Err(ExportError::unexpected(e.to_string(), false));
    }
    let artifact = match Artifact::from_path(target.output.clone(), false).await {
        Ok(artifact) => artifact,
        Err(e) => {
            target.discard(true).await;
            return Err(e);
        }
    };

    reporter
        .progress(ProgressEvent::new(
            job.job_id.clone(),
            100,
            Phase::Thumbnail,
            "thumbnail written",
        ))
        .await;
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::reporter::RecordingReporter;
    use crate::test_support::{context, replay_file, FakeEncoder};
    use replay_models::{ErrorCode, JobId, JobKind};
    use tempfile::TempDir;

    fn thumbnail_job(input: &std::path::Path, output: &str) -> ExportJob {
        ExportJob::new(JobId::from_string("thumb-1"), JobKind::ExportThumbnail, "replay-1")
            .with_option("inputPath", input.to_str().unwrap())
            .with_option("outputPath", output)
    }

    #[tokio::test]
    async fn test_thumbnail_written_without_encoder() {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(FakeEncoder::default());
        let ctx = context(dir.path(), encoder.clone(), Some("h264_nvenc"), true).await;
        let input = replay_file(dir.path(), &[0, 100, 200]).await;
        let output = ctx.export_root.path().join("thumbs").join("t.png");
        let job = thumbnail_job(&input, output.to_str().unwrap());
        let reporter = RecordingReporter::new();

        let artifact = export_thumbnail(&ctx, &job, &reporter, &JobLogger::for_job(&job))
            .await
            .unwrap();

        assert_eq!(artifact.path, output);
        assert!(ArtifactFormat::Png.is_valid(&output).await);
        assert!(encoder.attempts().is_empty());
        let events = reporter.progress_events();
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].phase, events[0].progress), (Phase::Thumbnail, 100));
        // only the published file remains
        let names: Vec<_> = std::fs::read_dir(output.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn test_thumbnail_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeEncoder::default()), None, false).await;
        let input = replay_file(dir.path(), &[0]).await;
        let output = ctx.export_root.path().join("t.png");
        let job = thumbnail_job(&input, output.to_str().unwrap());
        let reporter = RecordingReporter::new();
        let logger = JobLogger::for_job(&job);

        let first = export_thumbnail(&ctx, &job, &reporter, &logger).await.unwrap();
        let second = export_thumbnail(&ctx, &job, &reporter, &logger).await.unwrap();

        assert_eq!(first, second);
        // the second run reports no progress of its own
        assert_eq!(reporter.progress_events().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_output_path_rejected() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeEncoder::default()), None, false).await;
        let input = replay_file(dir.path(), &[0]).await;
        let job = thumbnail_job(&input, "");
        let reporter = RecordingReporter::new();

        let err = export_thumbnail(&ctx, &job, &reporter, &JobLogger::for_job(&job))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidOutputPath);
    }
}
