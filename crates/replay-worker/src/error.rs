//! Worker error types.

use thiserror::Error;

use replay_media::MediaError;
use replay_models::ErrorCode;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Failures of the worker process itself, outside any single job.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Queue error: {0}")]
    Queue(#[from] replay_queue::QueueError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

/// Why a single export job failed. Each variant maps to one wire error code.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{0}")]
    InvalidOutputPath(String),

    #[error("{0}")]
    InvalidReplayFormat(String),

    /// The final encode attempt failed.
    #[error("{}", .source.describe())]
    Encode {
        source: MediaError,
        hw_attempted: bool,
    },

    /// Anything else that went wrong while the job ran.
    #[error("{message}")]
    Unexpected { message: String, hw_attempted: bool },
}

impl ExportError {
    pub fn invalid_output_path(msg: impl Into<String>) -> Self {
        Self::InvalidOutputPath(msg.into())
    }

    pub fn invalid_replay_format(msg: impl Into<String>) -> Self {
        Self::InvalidReplayFormat(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>, hw_attempted: bool) -> Self {
        Self::Unexpected {
            message: msg.into(),
            hw_attempted,
        }
    }

    /// Wire error code for the result event.
    pub fn code(&self) -> ErrorCode {
        match self {
            ExportError::InvalidOutputPath(_) => ErrorCode::InvalidOutputPath,
            ExportError::InvalidReplayFormat(_) => ErrorCode::InvalidReplayFormat,
            ExportError::Encode {
                hw_attempted: false,
                ..
            } => ErrorCode::FfmpegFailed,
            ExportError::Encode {
                hw_attempted: true, ..
            } => ErrorCode::FfmpegFailedHw,
            ExportError::Unexpected {
                hw_attempted: false,
                ..
            } => ErrorCode::WorkerError,
            ExportError::Unexpected {
                hw_attempted: true, ..
            } => ErrorCode::WorkerHwFallbackFailed,
        }
    }
}
