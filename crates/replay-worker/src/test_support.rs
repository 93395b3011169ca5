//! Shared fixtures for unit tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use replay_media::{
    EncodeRequest, EncoderCapabilities, ExportRoot, FfmpegProgress, FrameSource, MediaError,
    MediaResult, ProgressSender, VideoEncoder,
};

use crate::processor::ProcessingContext;

/// Bytes that pass the MP4 validity check.
pub(crate) const MP4_STUB: &[u8] = b"\x00\x00\x00\x18ftypisom\x00\x00\x02\x00";

/// Context rooted at `dir/exports`, optionally advertising one hardware encoder.
pub(crate) async fn context(
    dir: &Path,
    encoder: Arc<dyn VideoEncoder>,
    hw_encoder: Option<&str>,
    hw_accel_enabled: bool,
) -> ProcessingContext {
    let export_root = ExportRoot::new(dir.join("exports")).await.unwrap();
    let encoders = hw_encoder.map(|e| vec![e.to_string()]).unwrap_or_default();
    let capabilities = EncoderCapabilities::from_lists(encoders, Vec::new(), Vec::new());
    ProcessingContext::with_encoder(export_root, capabilities, hw_accel_enabled, encoder, "test")
}

/// Replay log with one default snapshot per offset.
pub(crate) async fn replay_file(dir: &Path, offsets: &[u64]) -> PathBuf {
    let text: String = offsets
        .iter()
        .enumerate()
        .map(|(i, offset)| {
            format!(
                "{{\"offsetMs\": {}, \"snapshot\": {{\"ballX\": {}, \"leftScore\": {}}}}}\n",
                offset,
                100 + i * 10,
                i
            )
        })
        .collect();
    let path = dir.join("replay.jsonl");
    tokio::fs::write(&path, text).await.unwrap();
    path
}

/// Encoder that records what it was asked to do.
///
/// Frames are drained and counted. Codecs listed as failing leave a partial
/// file behind and fail the way FFmpeg does; codecs listed as panicking leave
/// a partial file behind and panic.
#[derive(Debug)]
pub(crate) struct FakeEncoder {
    failing: Vec<String>,
    panicking: Vec<String>,
    progress_us: Vec<i64>,
    attempts: Mutex<Vec<String>>,
    frames: Mutex<Vec<u64>>,
}

impl Default for FakeEncoder {
    fn default() -> Self {
        Self {
            failing: Vec::new(),
            panicking: Vec::new(),
            progress_us: Vec::new(),
            attempts: Mutex::new(Vec::new()),
            frames: Mutex::new(Vec::new()),
        }
    }
}

impl FakeEncoder {
    pub(crate) fn failing(codecs: &[&str]) -> Self {
        Self {
            failing: codecs.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Emit one progress block per `out_time_us` value.
    pub(crate) fn with_progress(progress_us: Vec<i64>) -> Self {
        Self {
            progress_us,
            ..Self::default()
        }
    }

    pub(crate) fn panicking(codecs: &[&str]) -> Self {
        Self {
            panicking: codecs.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Fail some codecs, then panic on others.
    pub(crate) fn failing_then_panicking(failing: &[&str], panicking: &[&str]) -> Self {
        Self {
            failing: failing.iter().map(|c| c.to_string()).collect(),
            ..Self::panicking(panicking)
        }
    }

    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn frames_seen(&self) -> Vec<u64> {
        self.frames.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoEncoder for FakeEncoder {
    async fn encode(
        &self,
        request: &EncodeRequest,
        frames: FrameSource,
        progress: ProgressSender,
    ) -> MediaResult<()> {
        let codec = request.profile.codec.clone();
        self.attempts.lock().unwrap().push(codec.clone());
        if self.panicking.contains(&codec) {
            tokio::fs::write(&request.output, b"partial").await?;
            panic!("fake encoder panicked on {}", codec);
        }

        let count = frames.count() as u64;
        self.frames.lock().unwrap().push(count);

        for (i, out_time_us) in self.progress_us.iter().enumerate() {
            let _ = progress.send(FfmpegProgress {
                out_time_us: *out_time_us,
                frame: i as u64,
                ..FfmpegProgress::default()
            });
        }

        if self.failing.contains(&codec) {
            tokio::fs::write(&request.output, b"partial").await?;
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(format!("fake encoder rejected {}", codec)),
                Some(1),
            ));
        }

        tokio::fs::write(&request.output, MP4_STUB).await?;
        Ok(())
    }
}
