//! Video encoding through an FFmpeg subprocess fed over stdin.
//!
//! The child has three pipes. Frames go in on stdin while stdout carries
//! `-progress` blocks and stderr carries diagnostics. All three are serviced
//! by independent tasks, so a full stdout or stderr pipe can never stall the
//! frame writer, and all of them are joined before the child's exit status
//! is interpreted.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use replay_models::encoding::{FRAME_BUFFER, OUTPUT_PIXEL_FORMAT, SOFTWARE_ENCODER};

use crate::command::{parse_progress_line, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Raw RGB24 frames in presentation order.
pub type FrameSource = Box<dyn Iterator<Item = Vec<u8>> + Send + 'static>;

/// Receives parsed progress blocks while the encoder runs.
pub type ProgressSender = mpsc::UnboundedSender<FfmpegProgress>;

/// Encoder and acceleration settings for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderProfile {
    /// Video codec (e.g., "libx264", "h264_nvenc")
    pub codec: String,
    /// Acceleration backend passed as `-hwaccel`
    pub hwaccel: Option<String>,
    /// Filters applied before encoding
    pub filters: Vec<String>,
}

impl EncoderProfile {
    /// Baseline software encoder.
    pub fn software() -> Self {
        Self {
            codec: SOFTWARE_ENCODER.to_string(),
            hwaccel: None,
            filters: Vec::new(),
        }
    }

    /// Hardware encoder with its matching backend.
    pub fn for_hardware(encoder: &str) -> Self {
        let (hwaccel, filters) = match encoder {
            "h264_vaapi" => (
                Some("vaapi"),
                vec!["format=nv12".to_string(), "hwupload".to_string()],
            ),
            "h264_qsv" => (Some("qsv"), Vec::new()),
            "h264_nvenc" => (Some("cuda"), Vec::new()),
            _ => (None, Vec::new()),
        };
        Self {
            codec: encoder.to_string(),
            hwaccel: hwaccel.map(str::to_string),
            filters,
        }
    }

    pub fn is_hardware(&self) -> bool {
        self.codec != SOFTWARE_ENCODER
    }
}

/// One encode attempt.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    /// Where the encoder writes (a temporary sibling of the final artifact)
    pub output: PathBuf,
    pub profile: EncoderProfile,
}

/// Turns a stream of raw frames into an MP4 file.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Encode every frame of `frames` into `request.output`.
    ///
    /// Progress blocks are sent on `progress` until the encoder's output ends.
    async fn encode(
        &self,
        request: &EncodeRequest,
        frames: FrameSource,
        progress: ProgressSender,
    ) -> MediaResult<()>;
}

/// [`VideoEncoder`] backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command line for an attempt.
    pub fn command_for(&self, request: &EncodeRequest) -> FfmpegCommand {
        let profile = &request.profile;
        let mut cmd = FfmpegCommand::new(self.program.clone(), &request.output);
        if let Some(ref backend) = profile.hwaccel {
            cmd = cmd.hwaccel(backend.clone());
        }
        cmd.raw_rgb_input()
            .video_codec(profile.codec.clone())
            .pixel_format(OUTPUT_PIXEL_FORMAT)
            .video_filters(&profile.filters)
            .faststart_mp4()
            .progress_to_stdout()
            .log_level("error")
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(
        &self,
        request: &EncodeRequest,
        frames: FrameSource,
        progress: ProgressSender,
    ) -> MediaResult<()> {
        let cmd = self.command_for(request);
        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", cmd.program(), args.join(" "));

        let mut child = Command::new(cmd.program())
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    MediaError::FfmpegNotFound(format!("{}: {}", cmd.program(), e))
                }
                _ => MediaError::Io(e),
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let progress_task = tokio::spawn(drain_progress(stdout, progress));
        let stderr_task = tokio::spawn(collect_stderr(stderr));

        // Rendering is CPU-bound; keep it off the async workers.
        let (frame_tx, frame_rx) = mpsc::channel::<Vec<u8>>(FRAME_BUFFER);
        let producer = tokio::task::spawn_blocking(move || {
            let mut produced = 0u64;
            for frame in frames {
                if frame_tx.blocking_send(frame).is_err() {
                    break;
                }
                produced += 1;
            }
            produced
        });

        let write_result = write_frames(stdin, frame_rx).await;
        if write_result.is_err() {
            if let Err(e) = child.start_kill() {
                debug!("FFmpeg already exited before kill: {}", e);
            }
        }

        let status = child.wait().await;

        let produced = producer.await;
        if let Err(e) = progress_task.await {
            warn!("FFmpeg progress reader failed: {}", e);
        }
        let stderr_text = match stderr_task.await {
            Ok(text) => text,
            Err(e) => {
                warn!("FFmpeg stderr reader failed: {}", e);
                String::new()
            }
        };

        if let Err(e) = write_result {
            return Err(MediaError::FrameWrite {
                message: e.to_string(),
                stderr: Some(stderr_text),
            });
        }

        let status = status?;
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(stderr_text),
                status.code(),
            ));
        }

        let frames_written = produced
            .map_err(|e| MediaError::internal(format!("frame renderer failed: {}", e)))?;
        debug!(frames = frames_written, output = %request.output.display(), "FFmpeg encode finished");

        Ok(())
    }
}

/// Write frames until the source is exhausted, then close stdin.
async fn write_frames(
    mut stdin: ChildStdin,
    mut frames: mpsc::Receiver<Vec<u8>>,
) -> std::io::Result<()> {
    while let Some(frame) = frames.recv().await {
        stdin.write_all(&frame).await?;
    }
    stdin.flush().await?;
    drop(stdin);
    Ok(())
}

/// Parse progress blocks until stdout closes. Keeps reading after the
/// receiver goes away so the pipe never fills.
async fn drain_progress(stdout: ChildStdout, progress: ProgressSender) {
    let mut reader = BufReader::new(stdout);
    let mut current = FfmpegProgress::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if let Some(block) = parse_progress_line(&line, &mut current) {
                    let _ = progress.send(block);
                }
            }
            Err(e) => {
                debug!("FFmpeg stdout read error: {}", e);
                break;
            }
        }
    }
}

async fn collect_stderr(mut stderr: ChildStderr) -> String {
    let mut buf = Vec::new();
    if let Err(e) = stderr.read_to_end(&mut buf).await {
        debug!("FFmpeg stderr read error: {}", e);
    }
    String::from_utf8_lossy(&buf).to_string()
}
