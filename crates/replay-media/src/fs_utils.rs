//! Export-root confinement and atomic publication of outputs.

use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Directory all outputs must live under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRoot {
    root: PathBuf,
}

impl ExportRoot {
    /// Create the root if needed and pin it to its canonical form.
    pub async fn new(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path).await?;
        let root = fs::canonicalize(path).await?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Canonicalize `raw` and check that it names a file under the root.
    ///
    /// `..` segments are resolved lexically, symlinks in the existing part of
    /// the path are followed. Nothing is created.
    pub async fn resolve(&self, raw: &str) -> MediaResult<PathBuf> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(MediaError::output_path_rejected("outputPath is empty"));
        }

        let requested = Path::new(raw);
        let absolute = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            std::env::current_dir()?.join(requested)
        };
        let resolved = canonicalize_existing_prefix(&normalize(&absolute)).await?;

        if resolved == self.root {
            return Err(MediaError::output_path_rejected(
                "outputPath must name a file, not the export root",
            ));
        }
        if !resolved.starts_with(&self.root) {
            return Err(MediaError::output_path_rejected(format!(
                "{} is outside the export root {}",
                resolved.display(),
                self.root.display()
            )));
        }
        Ok(resolved)
    }

    /// Create the parent directories of a resolved output path.
    pub async fn prepare_parent(&self, path: &Path) -> MediaResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// Drop `.` and apply `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor and re-append the rest.
async fn canonicalize_existing_prefix(path: &Path) -> MediaResult<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut rest = Vec::new();
    loop {
        match fs::canonicalize(&existing).await {
            Ok(canonical) => {
                let mut resolved = canonical;
                for part in rest.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(_) => {
                let Some(name) = existing.file_name().map(|n| n.to_os_string()) else {
                    return Err(MediaError::output_path_rejected(format!(
                        "cannot resolve {}",
                        path.display()
                    )));
                };
                rest.push(name);
                if !existing.pop() {
                    return Err(MediaError::output_path_rejected(format!(
                        "cannot resolve {}",
                        path.display()
                    )));
                }
            }
        }
    }
}

/// Hidden per-job sibling of `path` for in-progress writes.
pub fn temp_sibling(path: &Path, job_id: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let job: String = job_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    path.with_file_name(format!(".{}.{}.tmp", name, job))
}

/// Replace `dst` with `src` in a single rename.
///
/// Both paths must be on the same filesystem; there is no copy fallback.
pub async fn publish_atomically(src: &Path, dst: &Path) -> MediaResult<()> {
    fs::rename(src, dst).await.map_err(|e| {
        tracing::error!(
            "Failed to publish {} -> {}: {}",
            src.display(),
            dst.display(),
            e
        );
        MediaError::from(e)
    })
}

/// Remove a file, ignoring a missing one. Returns whether a file was removed.
pub async fn remove_if_exists(path: &Path) -> MediaResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(MediaError::from(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn root() -> (TempDir, ExportRoot) {
        let dir = TempDir::new().unwrap();
        let root = ExportRoot::new(dir.path().join("exports")).await.unwrap();
        (dir, root)
    }

    #[tokio::test]
    async fn test_resolve_inside_root() {
        let (_dir, root) = root().await;
        let raw = root.path().join("a").join("b.mp4");
        let resolved = root.resolve(raw.to_str().unwrap()).await.unwrap();
        assert_eq!(resolved, raw);
        // nothing is created by resolution
        assert!(!root.path().join("a").exists());

        root.prepare_parent(&resolved).await.unwrap();
        assert!(root.path().join("a").is_dir());
    }

    #[tokio::test]
    async fn test_resolve_rejects_escape() {
        let (dir, root) = root().await;
        let raw = format!("{}/../outside.mp4", root.path().display());
        let err = root.resolve(&raw).await.unwrap_err();
        assert!(matches!(err, MediaError::OutputPathRejected(_)));
        assert!(!dir.path().join("outside.mp4").exists());

        assert!(root.resolve("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_rejects_sibling_prefix() {
        let (dir, root) = root().await;
        let raw = dir.path().join("exports-evil").join("x.mp4");
        assert!(root.resolve(raw.to_str().unwrap()).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_rejects_empty_and_root() {
        let (_dir, root) = root().await;
        assert!(root.resolve("").await.is_err());
        assert!(root.resolve("   ").await.is_err());
        assert!(root.resolve(root.path().to_str().unwrap()).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_follows_symlinks() {
        let (dir, root) = root().await;
        let outside = dir.path().join("outside");
        fs::create_dir_all(&outside).await.unwrap();
        std::os::unix::fs::symlink(&outside, root.path().join("link")).unwrap();

        let raw = root.path().join("link").join("x.mp4");
        assert!(root.resolve(raw.to_str().unwrap()).await.is_err());
    }

    #[test]
    fn test_temp_sibling() {
        let tmp = temp_sibling(Path::new("/exports/r1/video.mp4"), "job/42");
        assert_eq!(tmp, PathBuf::from("/exports/r1/.video.mp4.job_42.tmp"));
    }

    #[tokio::test]
    async fn test_publish_replaces_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join(".out.mp4.1.tmp");
        let dst = dir.path().join("out.mp4");
        fs::write(&src, b"new content").await.unwrap();
        fs::write(&dst, b"old content").await.unwrap();

        publish_atomically(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "new content");
    }

    #[tokio::test]
    async fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x");
        fs::write(&path, b"x").await.unwrap();
        assert!(remove_if_exists(&path).await.unwrap());
        assert!(!remove_if_exists(&path).await.unwrap());
    }
}
