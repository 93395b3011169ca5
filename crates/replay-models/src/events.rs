//! Progress and result events published by the worker.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;

/// Stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Worker picked the job up
    Queue,
    /// Encoder is being launched
    Prepare,
    /// Frames are being encoded
    Encode,
    /// Thumbnail written
    Thumbnail,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Queue => "QUEUE",
            Phase::Prepare => "PREPARE",
            Phase::Encode => "ENCODE",
            Phase::Thumbnail => "THUMBNAIL",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-terminal status update for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: JobId,
    /// 0..=100
    pub progress: u8,
    pub phase: Phase,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(job_id: JobId, progress: u8, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            job_id,
            progress: progress.min(100),
            phase,
            message: message.into(),
        }
    }

    /// Stream fields in publication order.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("jobId", self.job_id.to_string()),
            ("progress", self.progress.to_string()),
            ("phase", self.phase.as_str().to_string()),
            ("message", self.message.clone()),
        ]
    }
}

/// Terminal status of a job attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes carried by failed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Output path empty or outside the export root
    InvalidOutputPath,
    /// Replay log missing, empty or malformed
    InvalidReplayFormat,
    /// Software encode failed, no hardware attempt before it
    FfmpegFailed,
    /// Software encode failed after a hardware attempt
    FfmpegFailedHw,
    /// Unexpected failure
    WorkerError,
    /// Unexpected failure after a hardware attempt
    WorkerHwFallbackFailed,
    /// Unknown job kind
    UnsupportedType,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidOutputPath => "INVALID_OUTPUT_PATH",
            ErrorCode::InvalidReplayFormat => "INVALID_REPLAY_FORMAT",
            ErrorCode::FfmpegFailed => "FFMPEG_FAILED",
            ErrorCode::FfmpegFailedHw => "FFMPEG_FAILED_HW",
            ErrorCode::WorkerError => "WORKER_ERROR",
            ErrorCode::WorkerHwFallbackFailed => "WORKER_HW_FALLBACK_FAILED",
            ErrorCode::UnsupportedType => "UNSUPPORTED_TYPE",
        }
    }

    /// True for codes that only occur once a hardware attempt was made.
    pub fn is_hardware_tagged(&self) -> bool {
        matches!(self, ErrorCode::FfmpegFailedHw | ErrorCode::WorkerHwFallbackFailed)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result for one job attempt. Exactly one is published per accepted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobResult {
    pub fn succeeded(job_id: JobId, result_uri: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            job_id,
            status: JobStatus::Succeeded,
            result_uri: Some(result_uri.into()),
            checksum: Some(checksum.into()),
            error_code: None,
            error_message: None,
        }
    }

    pub fn failed(job_id: JobId, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            job_id,
            status: JobStatus::Failed,
            result_uri: None,
            checksum: None,
            error_code: Some(code),
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    /// Stream fields; absent values are published as empty strings.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("jobId", self.job_id.to_string()),
            ("status", self.status.as_str().to_string()),
            ("resultUri", self.result_uri.clone().unwrap_or_default()),
            ("checksum", self.checksum.clone().unwrap_or_default()),
            (
                "errorCode",
                self.error_code.map(|c| c.as_str().to_string()).unwrap_or_default(),
            ),
            ("errorMessage", self.error_message.clone().unwrap_or_default()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_clamped() {
        let event = ProgressEvent::new(JobId::from_string("1"), 140, Phase::Encode, "x");
        assert_eq!(event.progress, 100);
    }

    #[test]
    fn test_progress_fields() {
        let event = ProgressEvent::new(JobId::from_string("3"), 10, Phase::Queue, "accepted");
        assert_eq!(
            event.to_fields(),
            vec![
                ("jobId", "3".to_string()),
                ("progress", "10".to_string()),
                ("phase", "QUEUE".to_string()),
                ("message", "accepted".to_string()),
            ]
        );
    }

    #[test]
    fn test_failed_result_fields() {
        let result = JobResult::failed(JobId::from_string("8"), ErrorCode::FfmpegFailedHw, "boom");
        let fields = result.to_fields();
        assert!(fields.contains(&("status", "FAILED".to_string())));
        assert!(fields.contains(&("errorCode", "FFMPEG_FAILED_HW".to_string())));
        assert!(fields.contains(&("resultUri", String::new())));
        assert!(!result.is_success());
    }

    #[test]
    fn test_succeeded_result_fields() {
        let result = JobResult::succeeded(JobId::from_string("8"), "/x/8.mp4", "abc");
        let fields = result.to_fields();
        assert!(fields.contains(&("status", "SUCCEEDED".to_string())));
        assert!(fields.contains(&("checksum", "abc".to_string())));
        assert!(fields.contains(&("errorCode", String::new())));
    }

    #[test]
    fn test_error_code_wire_names() {
        let json = serde_json::to_string(&ErrorCode::WorkerHwFallbackFailed).unwrap();
        assert_eq!(json, "\"WORKER_HW_FALLBACK_FAILED\"");
        assert_eq!(ErrorCode::InvalidOutputPath.as_str(), "INVALID_OUTPUT_PATH");
        assert!(ErrorCode::FfmpegFailedHw.is_hardware_tagged());
        assert!(!ErrorCode::FfmpegFailed.is_hardware_tagged());
    }
}
