//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during rendering, encoding and publishing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Failed to feed frames to FFmpeg: {message}")]
    FrameWrite {
        message: String,
        stderr: Option<String>,
    },

    #[error("Output path rejected: {0}")]
    OutputPathRejected(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an output path rejection.
    pub fn output_path_rejected(message: impl Into<String>) -> Self {
        Self::OutputPathRejected(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Diagnostic text captured from the encoder, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            MediaError::FfmpegFailed { stderr, .. } | MediaError::FrameWrite { stderr, .. } => {
                stderr.as_deref().filter(|s| !s.trim().is_empty())
            }
            _ => None,
        }
    }

    /// One-line description including encoder diagnostics.
    pub fn describe(&self) -> String {
        match self.stderr() {
            Some(stderr) => format!("{}; stderr={}", self, stderr.trim()),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_includes_stderr() {
        let err = MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some("Unknown encoder 'h264_nvenc'\n".to_string()),
            Some(1),
        );
        assert_eq!(
            err.describe(),
            "FFmpeg command failed: FFmpeg exited with non-zero status; stderr=Unknown encoder 'h264_nvenc'"
        );

        let err = MediaError::ffmpeg_failed("x", Some("  ".to_string()), None);
        assert_eq!(err.describe(), "FFmpeg command failed: x");
    }
}
