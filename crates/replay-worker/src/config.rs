//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory every output must live under
    pub export_root: PathBuf,
    /// Try the detected hardware encoder before libx264
    pub hw_accel_enabled: bool,
    /// FFmpeg binary
    pub ffmpeg_bin: String,
    /// Pause after each processed entry
    pub job_pause: Duration,
    /// Back-off after a failed queue read
    pub read_error_backoff: Duration,
    /// Prometheus exporter port; no exporter when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            export_root: PathBuf::from("/data/replays/exports"),
            hw_accel_enabled: false,
            ffmpeg_bin: "ffmpeg".to_string(),
            job_pause: Duration::from_millis(100),
            read_error_backoff: Duration::from_secs(5),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            export_root: std::env::var("JOB_EXPORT_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.export_root),
            hw_accel_enabled: std::env::var("EXPORT_HW_ACCEL")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.hw_accel_enabled),
            ffmpeg_bin: std::env::var("FFMPEG_BIN")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.ffmpeg_bin),
            job_pause: std::env::var("WORKER_JOB_PAUSE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.job_pause),
            read_error_backoff: defaults.read_error_backoff,
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

/// Only `true` (any case) enables a flag.
fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
