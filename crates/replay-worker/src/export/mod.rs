//! Export jobs: shared output handling for video and thumbnail exports.
//!
//! Both exports validate the output path before touching anything, load the
//! replay, short-circuit when a valid artifact is already in place, and
//! publish through a per-job temporary sibling.

mod thumbnail;
mod video;

pub use thumbnail::export_thumbnail;
pub use video::{export_video, EncodeState};

use std::path::{Path, PathBuf};

use tracing::warn;

use replay_media::{checksum_file, remove_if_exists, temp_sibling, ArtifactFormat};
use replay_models::{ExportJob, ReplaySequence};

use crate::error::ExportError;
use crate::logging::JobLogger;
use crate::processor::ProcessingContext;
use crate::replay_loader::load_replay;

/// A published artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Lowercase hex SHA-256
    pub checksum: String,
}

impl Artifact {
    /// Checksum the file at `path`.
    pub(crate) async fn from_path(path: PathBuf, hw_attempted: bool) -> Result<Self, ExportError> {
        let checksum = checksum_file(&path)
            .await
            .map_err(|e| ExportError::unexpected(e.to_string(), hw_attempted))?;
        Ok(Self { path, checksum })
    }
}

/// Final and temporary locations for one job's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub output: PathBuf,
    pub temp: PathBuf,
}

impl OutputTarget {
    /// Remove the temporary file and, when this job published it, the final one.
    pub(crate) async fn discard(&self, published: bool) {
        discard_file(&self.temp).await;
        if published {
            discard_file(&self.output).await;
        }
    }
}

async fn discard_file(path: &Path) {
    if let Err(e) = remove_if_exists(path).await {
        warn!(path = %path.display(), "Failed to remove file: {}", e);
    }
}

/// Result of the shared preparation step.
#[derive(Debug)]
pub(crate) enum Prepared {
    /// A valid artifact already exists at the output path.
    Existing(Artifact),
    /// Nothing usable exists; render into `target.temp`.
    Fresh {
        target: OutputTarget,
        sequence: ReplaySequence,
    },
}

/// Validate the output path, load the replay and check for an existing artifact.
pub(crate) async fn prepare(
    ctx: &ProcessingContext,
    job: &ExportJob,
    format: ArtifactFormat,
    logger: &JobLogger,
) -> Result<Prepared, ExportError> {
    let output = ctx
        .export_root
        .resolve(job.output_path().unwrap_or_default())
        .await
        .map_err(|e| ExportError::invalid_output_path(e.to_string()))?;

    let sequence = load_replay(job.input_path()).await?;

    if format.is_valid(&output).await {
        logger.log_progress(&format!(
            "valid artifact already at {}, skipping render",
            output.display()
        ));
        return Ok(Prepared::Existing(Artifact::from_path(output, false).await?));
    }
    if remove_if_exists(&output)
        .await
        .map_err(|e| ExportError::unexpected(e.to_string(), false))?
    {
        logger.log_warning(&format!("removed invalid artifact at {}", output.display()));
    }

    ctx.export_root
        .prepare_parent(&output)
        .await
        .map_err(|e| ExportError::unexpected(e.to_string(), false))?;

    let temp = temp_sibling(&output, &format!("{}.{}", job.job_id, ctx.worker_id));
    remove_if_exists(&temp)
        .await
        .map_err(|e| ExportError::unexpected(e.to_string(), false))?;

    Ok(Prepared::Fresh {
        target: OutputTarget { output, temp },
        sequence,
    })
}
