//! Output signature checks and checksums.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::error::{MediaError, MediaResult};

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";
const MP4_MARKER: &[u8; 4] = b"ftyp";
/// Bytes of an MP4 searched for the `ftyp` box.
const MP4_HEAD_LEN: usize = 256;

/// Kind of artifact a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Mp4,
    Png,
}

impl ArtifactFormat {
    /// True when `path` exists, is non-empty and starts like this format.
    ///
    /// Cheap enough to run on every idempotency check; it is not a full decode.
    pub async fn is_valid(&self, path: &Path) -> bool {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {}
            _ => return false,
        }
        let head = match read_head(path, self.head_len()).await {
            Ok(head) => head,
            Err(_) => return false,
        };
        match self {
            ArtifactFormat::Mp4 => head.windows(MP4_MARKER.len()).any(|w| w == MP4_MARKER),
            ArtifactFormat::Png => head.starts_with(PNG_SIGNATURE),
        }
    }

    fn head_len(&self) -> usize {
        match self {
            ArtifactFormat::Mp4 => MP4_HEAD_LEN,
            ArtifactFormat::Png => PNG_SIGNATURE.len(),
        }
    }
}

async fn read_head(path: &Path, len: usize) -> std::io::Result<Vec<u8>> {
    let file = fs::File::open(path).await?;
    let mut head = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut head).await?;
    Ok(head)
}

/// Lowercase hex SHA-256 of a file's contents.
pub async fn checksum_file(path: &Path) -> MediaResult<String> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> MediaResult<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| MediaError::internal(format!("checksum task failed: {}", e)))?
}
