//! MP4 export: hardware attempt, software fallback, atomic publish.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::debug;

use replay_media::{
    expected_duration_ms, publish_atomically, ArtifactFormat, EncodeRequest, EncoderProfile,
    FfmpegProgress, FrameSource, FrameSynthesizer, MediaError, MediaResult,
};
use replay_models::{ExportJob, JobId, Phase, ProgressEvent, ReplaySequence};

use super::{discard_file, prepare, Artifact, OutputTarget, Prepared};
use crate::error::ExportError;
use crate::logging::JobLogger;
use crate::metrics;
use crate::processor::{panic_message, ProcessingContext};
use crate::reporter::JobReporter;

const PREPARE_PERCENT: u8 = 5;

/// Everything an encode attempt needs.
#[derive(Debug, Clone)]
pub struct VideoPlan {
    pub target: OutputTarget,
    pub sequence: Arc<ReplaySequence>,
    pub expected_ms: u64,
}

/// Steps of a video export.
#[derive(Debug)]
pub enum EncodeState {
    Init,
    HwAttempt {
        plan: VideoPlan,
        profile: EncoderProfile,
    },
    SwAttempt {
        plan: VideoPlan,
        hw_attempted: bool,
    },
    Publish {
        plan: VideoPlan,
        hw_attempted: bool,
    },
    Done(Artifact),
    Failed(ExportError),
}

impl EncodeState {
    fn name(&self) -> &'static str {
        match self {
            EncodeState::Init => "init",
            EncodeState::HwAttempt { .. } => "hw_attempt",
            EncodeState::SwAttempt { .. } => "sw_attempt",
            EncodeState::Publish { .. } => "publish",
            EncodeState::Done(_) => "done",
            EncodeState::Failed(_) => "failed",
        }
    }
}

/// Render the whole replay into an MP4 at the job's output path.
pub async fn export_video(
    ctx: &ProcessingContext,
    job: &ExportJob,
    reporter: &dyn JobReporter,
    logger: &JobLogger,
) -> Result<Artifact, ExportError> {
    let mut state = EncodeState::Init;
    loop {
        debug!(job_id = %job.job_id, state = state.name(), "Export state");
        state = match state {
            EncodeState::Init => init(ctx, job, logger).await,
            EncodeState::HwAttempt { plan, profile } => {
                hw_attempt(ctx, job, reporter, logger, plan, profile).await
            }
            EncodeState::SwAttempt { plan, hw_attempted } => {
                sw_attempt(ctx, job, reporter, logger, plan, hw_attempted).await
            }
            EncodeState::Publish { plan, hw_attempted } => publish(plan, hw_attempted).await,
            EncodeState::Done(artifact) => return Ok(artifact),
            EncodeState::Failed(err) => return Err(err),
        };
    }
}

async fn init(ctx: &ProcessingContext, job: &ExportJob, logger: &JobLogger) -> EncodeState {
    let (target, sequence) = match prepare(ctx, job, ArtifactFormat::Mp4, logger).await {
        Ok(Prepared::Existing(artifact)) => return EncodeState::Done(artifact),
        Ok(Prepared::Fresh { target, sequence }) => (target, sequence),
        Err(e) => return EncodeState::Failed(e),
    };

    let expected_ms = expected_duration_ms(&sequence, job.duration_hint_ms());
    logger.log_progress(&format!(
        "{} events, {} ms to encode",
        sequence.len(),
        expected_ms
    ));
    let plan = VideoPlan {
        target,
        sequence: Arc::new(sequence),
        expected_ms,
    };

    match ctx.hw_profile() {
        Some(profile) => EncodeState::HwAttempt {
            plan,
            profile: profile.clone(),
        },
        None => EncodeState::SwAttempt {
            plan,
            hw_attempted: false,
        },
    }
}

async fn hw_attempt(
    ctx: &ProcessingContext,
    job: &ExportJob,
    reporter: &dyn JobReporter,
    logger: &JobLogger,
    plan: VideoPlan,
    profile: EncoderProfile,
) -> EncodeState {
    logger.log_progress(&format!(
        "hardware encode with {} (hwaccel {})",
        profile.codec,
        profile.hwaccel.as_deref().unwrap_or("none")
    ));

    match guarded_attempt(ctx, &job.job_id, reporter, &plan, &profile).await {
        Ok(Ok(())) => EncodeState::Publish {
            plan,
            hw_attempted: true,
        },
        Err(panicked) => {
            plan.target.discard(false).await;
            EncodeState::Failed(ExportError::unexpected(panicked, true))
        }
        Ok(Err(e)) => {
            logger.log_warning(&format!(
                "hardware encode with {} failed, falling back to software: {}",
                profile.codec,
                e.describe()
            ));
            metrics::record_hw_fallback(&profile.codec);
            discard_file(&plan.target.temp).await;
            EncodeState::SwAttempt {
                plan,
                hw_attempted: true,
            }
        }
    }
}

async fn sw_attempt(
    ctx: &ProcessingContext,
    job: &ExportJob,
    reporter: &dyn JobReporter,
    logger: &JobLogger,
    plan: VideoPlan,
    hw_attempted: bool,
) -> EncodeState {
    if ArtifactFormat::Mp4.is_valid(&plan.target.temp).await {
        return EncodeState::Publish { plan, hw_attempted };
    }

    let profile = EncoderProfile::software();
    logger.log_progress(&format!("software encode with {}", profile.codec));

    let outcome = match guarded_attempt(ctx, &job.job_id, reporter, &plan, &profile).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(MediaError::Internal(message))) => {
            Err(ExportError::unexpected(message, hw_attempted))
        }
        Ok(Err(source)) => Err(ExportError::Encode {
            source,
            hw_attempted,
        }),
        Err(panicked) => Err(ExportError::unexpected(panicked, hw_attempted)),
    };

    match outcome {
        Ok(()) => EncodeState::Publish { plan, hw_attempted },
        Err(err) => {
            plan.target.discard(false).await;
            EncodeState::Failed(err)
        }
    }
}

async fn publish(plan: VideoPlan, hw_attempted: bool) -> EncodeState {
    let target = plan.target;
    if let Err(e) = publish_atomically(&target.temp, &target.output).await {
        target.discard(false).await;
        return EncodeState::Failed(ExportError::unexpected(e.to_string(), hw_attempted));
    }
    match Artifact::from_path(target.output.clone(), hw_attempted).await {
        Ok(artifact) => EncodeState::Done(artifact),
        Err(e) => {
            target.discard(true).await;
            EncodeState::Failed(e)
        }
    }
}

/// [`run_attempt`] with a panic in the encoder or renderer returned as `Err(message)`.
async fn guarded_attempt(
    ctx: &ProcessingContext,
    job_id: &JobId,
    reporter: &dyn JobReporter,
    plan: &VideoPlan,
    profile: &EncoderProfile,
) -> Result<MediaResult<()>, String> {
    AssertUnwindSafe(run_attempt(ctx, job_id, reporter, plan, profile))
        .catch_unwind()
        .await
        .map_err(|panic| {
            format!(
                "{} encode panicked: {}",
                profile.codec,
                panic_message(panic.as_ref())
            )
        })
}

/// One encoder run into the plan's temporary path.
async fn run_attempt(
    ctx: &ProcessingContext,
    job_id: &JobId,
    reporter: &dyn JobReporter,
    plan: &VideoPlan,
    profile: &EncoderProfile,
) -> MediaResult<()> {
    reporter
        .progress(ProgressEvent::new(
            job_id.clone(),
            PREPARE_PERCENT,
            Phase::Prepare,
            format!("starting {}", profile.codec),
        ))
        .await;

    let frames: FrameSource = Box::new(FrameSynthesizer::new(
        Arc::clone(&plan.sequence),
        ctx.rasterizer.clone(),
        plan.expected_ms,
    ));
    let request = EncodeRequest {
        output: plan.target.temp.clone(),
        profile: profile.clone(),
    };
    let (tx, rx) = mpsc::unbounded_channel();

    let started = Instant::now();
    let (result, ()) = tokio::join!(
        ctx.encoder.encode(&request, frames, tx),
        forward_progress(rx, reporter, job_id, plan.expected_ms),
    );

    let mut result = result;
    if result.is_ok() && !ArtifactFormat::Mp4.is_valid(&plan.target.temp).await {
        result = Err(MediaError::ffmpeg_failed(
            "encoder exited cleanly without writing an MP4",
            None,
            Some(0),
        ));
    }
    metrics::record_encode(&profile.codec, result.is_ok(), started.elapsed());

    if result.is_ok() {
        reporter
            .progress(ProgressEvent::new(
                job_id.clone(),
                100,
                Phase::Encode,
                "encode finished",
            ))
            .await;
    }
    result
}

/// Turn encoder progress into ENCODE events, skipping repeated percentages.
async fn forward_progress(
    mut rx: mpsc::UnboundedReceiver<FfmpegProgress>,
    reporter: &dyn JobReporter,
    job_id: &JobId,
    expected_ms: u64,
) {
    let mut last = None;
    while let Some(progress) = rx.recv().await {
        let percent = progress.percent_of(expected_ms);
        if last == Some(percent) {
            continue;
        }
        last = Some(percent);
        let message = if progress.is_complete {
            "finalizing"
        } else {
            "encoding"
        };
        reporter
            .progress(ProgressEvent::new(job_id.clone(), percent, Phase::Encode, message))
            .await;
    }
}
