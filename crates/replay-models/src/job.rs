//! Export job definitions as carried on the request stream.
//!
//! Requests arrive as flat string maps. The well-known keys become typed
//! fields; everything else is kept in the option map.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field names used on the request stream.
pub mod fields {
    pub const JOB_ID: &str = "jobId";
    pub const JOB_TYPE: &str = "jobType";
    pub const REPLAY_ID: &str = "replayId";
    pub const INPUT_PATH: &str = "inputPath";
    pub const OUTPUT_PATH: &str = "outputPath";
    pub const DURATION_MS: &str = "durationMs";
}

/// Unique identifier for a job, assigned by the producer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of export requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum JobKind {
    /// Render the whole replay into an H.264 MP4.
    #[serde(rename = "REPLAY_EXPORT_MP4", alias = "EXPORT_VIDEO")]
    ExportVideo,
    /// Render the midpoint snapshot into a PNG.
    #[serde(rename = "REPLAY_THUMBNAIL", alias = "EXPORT_THUMBNAIL")]
    ExportThumbnail,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ExportVideo => "REPLAY_EXPORT_MP4",
            JobKind::ExportThumbnail => "REPLAY_THUMBNAIL",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "REPLAY_EXPORT_MP4" | "EXPORT_VIDEO" => Ok(JobKind::ExportVideo),
            "REPLAY_THUMBNAIL" | "EXPORT_THUMBNAIL" => Ok(JobKind::ExportThumbnail),
            other => Err(other.to_string()),
        }
    }
}

/// Reasons a request map cannot become an [`ExportJob`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Nothing to answer to; the entry can only be dropped.
    #[error("request has no jobId")]
    MissingJobId,

    #[error("job {0} has no jobType")]
    MissingJobType(JobId),

    #[error("unsupported job type {kind}")]
    UnsupportedKind { job_id: JobId, kind: String },
}

impl RequestError {
    /// Job the error can be reported against, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            RequestError::MissingJobId => None,
            RequestError::MissingJobType(id) => Some(id),
            RequestError::UnsupportedKind { job_id, .. } => Some(job_id),
        }
    }
}

/// An export job accepted from the request stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExportJob {
    /// Producer-assigned job ID
    pub job_id: JobId,
    /// What to export
    pub kind: JobKind,
    /// Replay being exported (informational)
    pub replay_id: String,
    /// Remaining request fields (inputPath, outputPath, durationMs, ...)
    pub options: HashMap<String, String>,
}

impl ExportJob {
    pub fn new(job_id: JobId, kind: JobKind, replay_id: impl Into<String>) -> Self {
        Self {
            job_id,
            kind,
            replay_id: replay_id.into(),
            options: HashMap::new(),
        }
    }

    /// Set an option field.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Build a job from the flat field map of a stream entry.
    pub fn from_fields(mut map: HashMap<String, String>) -> Result<Self, RequestError> {
        let job_id = map
            .remove(fields::JOB_ID)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(JobId)
            .ok_or(RequestError::MissingJobId)?;

        let raw_kind = map
            .remove(fields::JOB_TYPE)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| RequestError::MissingJobType(job_id.clone()))?;

        let kind = raw_kind
            .parse::<JobKind>()
            .map_err(|kind| RequestError::UnsupportedKind {
                job_id: job_id.clone(),
                kind,
            })?;

        let replay_id = map.remove(fields::REPLAY_ID).unwrap_or_default();

        Ok(Self {
            job_id,
            kind,
            replay_id,
            options: map,
        })
    }

    /// Flatten back into stream fields.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut out = vec![
            (fields::JOB_ID.to_string(), self.job_id.to_string()),
            (fields::JOB_TYPE.to_string(), self.kind.as_str().to_string()),
            (fields::REPLAY_ID.to_string(), self.replay_id.clone()),
        ];
        let mut options: Vec<_> = self.options.iter().collect();
        options.sort();
        out.extend(options.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }

    fn option(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// Replay log to read.
    pub fn input_path(&self) -> Option<&str> {
        self.option(fields::INPUT_PATH)
    }

    /// Requested artifact location.
    pub fn output_path(&self) -> Option<&str> {
        self.option(fields::OUTPUT_PATH)
    }

    /// Caller-supplied duration hint. Unparseable or negative values count as 0.
    pub fn duration_hint_ms(&self) -> u64 {
        self.option(fields::DURATION_MS)
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(|v| v.max(0) as u64)
            .unwrap_or(0)
    }
}
