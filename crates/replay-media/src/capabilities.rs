//! Encoder capability probing and hardware encoder selection.
//!
//! The probe runs once per process. Its result is an immutable value that is
//! handed to the export pipeline explicitly.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use replay_models::encoding::HW_ENCODER_PRIORITY;

use crate::encoder::EncoderProfile;
use crate::error::{MediaError, MediaResult};

/// Markers of hardware-backed encoders in `ffmpeg -encoders` output.
const HW_ENCODER_TAGS: [&str; 5] = ["nvenc", "qsv", "vaapi", "videotoolbox", "amf"];
/// Codecs whose decoders are worth reporting.
const DECODER_TAGS: [&str; 2] = ["h264", "hevc"];

/// What the local FFmpeg build can do, and which hardware encoder to try.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncoderCapabilities {
    /// Hardware-backed encoder names
    pub encoders: Vec<String>,
    /// Acceleration backends
    pub hwaccels: Vec<String>,
    /// H.264/HEVC decoder names
    pub decoders: Vec<String>,
    selected: Option<EncoderProfile>,
}

impl EncoderCapabilities {
    /// Software only; nothing detected.
    pub fn software_only() -> Self {
        Self::default()
    }

    /// Build from already-enumerated lists and select a hardware encoder.
    pub fn from_lists(encoders: Vec<String>, hwaccels: Vec<String>, decoders: Vec<String>) -> Self {
        let selected = select_hw_encoder(&encoders).map(EncoderProfile::for_hardware);
        Self {
            encoders,
            hwaccels,
            decoders,
            selected,
        }
    }

    /// Enumerate encoders, acceleration backends and decoders.
    ///
    /// Each enumeration that fails is logged and treated as empty.
    pub async fn probe(ffmpeg: &str) -> Self {
        let encoders = match enumerate(ffmpeg, "-encoders").await {
            Ok(out) => parse_encoders(&out),
            Err(e) => {
                warn!(error = %e, "Failed to list FFmpeg encoders");
                Vec::new()
            }
        };
        let hwaccels = match enumerate(ffmpeg, "-hwaccels").await {
            Ok(out) => parse_hwaccels(&out),
            Err(e) => {
                warn!(error = %e, "Failed to list FFmpeg hwaccels");
                Vec::new()
            }
        };
        let decoders = match enumerate(ffmpeg, "-decoders").await {
            Ok(out) => parse_decoders(&out),
            Err(e) => {
                warn!(error = %e, "Failed to list FFmpeg decoders");
                Vec::new()
            }
        };

        let caps = Self::from_lists(encoders, hwaccels, decoders);
        match caps.selected_hw_encoder() {
            Some(profile) => info!(
                encoder = %profile.codec,
                hwaccels = %caps.hwaccels.join(","),
                "Hardware encoder detected"
            ),
            None => info!("No supported hardware encoder detected, software encoding only"),
        }
        caps
    }

    /// Highest-priority hardware encoder available, if any.
    pub fn selected_hw_encoder(&self) -> Option<&EncoderProfile> {
        self.selected.as_ref()
    }
}

/// First entry of the priority list present in `encoders`.
pub fn select_hw_encoder(encoders: &[String]) -> Option<&'static str> {
    HW_ENCODER_PRIORITY
        .iter()
        .copied()
        .find(|candidate| encoders.iter().any(|e| e == candidate))
}

/// Names of hardware-backed encoders in `ffmpeg -encoders` output.
pub fn parse_encoders(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| HW_ENCODER_TAGS.iter().any(|tag| line.contains(tag)))
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

/// Backends listed by `ffmpeg -hwaccels`.
pub fn parse_hwaccels(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Hardware"))
        .map(str::to_string)
        .collect()
}

/// H.264/HEVC decoder names in `ffmpeg -decoders` output.
pub fn parse_decoders(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| DECODER_TAGS.iter().any(|tag| line.contains(tag)))
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

async fn enumerate(ffmpeg: &str, flag: &str) -> MediaResult<String> {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", flag])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| MediaError::FfmpegNotFound(format!("{}: {}", ffmpeg, e)))?;

    if !output.status.success() {
        return Err(MediaError::ffmpeg_failed(
            format!("ffmpeg {} failed", flag),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
            output.status.code(),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
