//! FFmpeg progress state.

use serde::{Deserialize, Serialize};

/// Highest percentage reported while the encoder is still running.
pub const MAX_RUNNING_PERCENT: u8 = 99;

/// Progress information from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Encoded output time in microseconds
    pub out_time_us: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// `progress=end` was seen
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Elapsed encoded time as a share of `expected_ms`, clamped to 0..=99.
    ///
    /// 100 is reserved for a clean encoder exit.
    pub fn percent_of(&self, expected_ms: u64) -> u8 {
        if self.is_complete {
            return MAX_RUNNING_PERCENT;
        }
        let expected_us = expected_ms.max(1) as f64 * 1000.0;
        let percent = (self.out_time_us.max(0) as f64 / expected_us) * 100.0;
        percent.clamp(0.0, MAX_RUNNING_PERCENT as f64) as u8
    }
}
