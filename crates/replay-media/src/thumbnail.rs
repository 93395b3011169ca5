//! PNG thumbnails of a single snapshot.

use std::path::Path;

use image::ImageFormat;
use tracing::debug;

use replay_models::Snapshot;

use crate::error::{MediaError, MediaResult};
use crate::render::Rasterizer;

/// Render `snapshot` and write it to `path` as PNG.
///
/// The format is explicit so temporary paths without a `.png` extension work.
pub async fn write_thumbnail(rasterizer: &Rasterizer, snapshot: &Snapshot, path: &Path) -> MediaResult<()> {
    let rasterizer = rasterizer.clone();
    let snapshot = *snapshot;
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> MediaResult<()> {
        let image = rasterizer.render(&snapshot);
        image.save_with_format(&path, ImageFormat::Png)?;
        debug!(path = %path.display(), "Thumbnail written");
        Ok(())
    })
    .await
    .map_err(|e| MediaError::internal(format!("thumbnail task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactFormat;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_thumbnail_is_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".thumb.png.7.tmp");

        write_thumbnail(&Rasterizer::new(), &Snapshot::default(), &path)
            .await
            .unwrap();

        assert!(ArtifactFormat::Png.is_valid(&path).await);
        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), 1280);
        assert_eq!(decoded.height(), 720);
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("thumb.png");
        let result = write_thumbnail(&Rasterizer::new(), &Snapshot::default(), &path).await;
        assert!(result.is_err());
    }
}
