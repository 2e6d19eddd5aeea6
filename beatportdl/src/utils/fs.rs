//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and
//! the scoped temp-file guard used by the track pipeline.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result};

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io_path("creating directory", path, e))
}

/// Ensure a directory exists (synchronous variant).
pub fn ensure_dir_all_sync(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::io_path("creating directory", path, e))
}

/// Move `from` to `to`, copying across filesystems when a rename is not possible.
pub async fn move_file(from: &Path, to: &Path) -> Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            debug!(from = %from.display(), to = %to.display(), "rename crosses devices, copying");
            if let Err(e) = tokio::fs::copy(from, to).await {
                let _ = tokio::fs::remove_file(to).await;
                return Err(Error::io_path("copying file", to, e));
            }
            tokio::fs::remove_file(from)
                .await
                .map_err(|e| Error::io_path("removing file", from, e))
        }
        Err(e) => Err(Error::io_path("moving file", from, e)),
    }
}

/// Remove `dir` if it is empty and is not `root`.
pub async fn remove_dir_if_empty(dir: &Path, root: &Path) {
    if dir == root {
        return;
    }
    // Fails on non-empty directories, which is the point.
    if tokio::fs::remove_dir(dir).await.is_ok() {
        debug!(path = %dir.display(), "removed empty directory");
    }
}

/// A file that is deleted when the guard drops, unless it is kept.
///
/// Every temp artifact of a track pipeline lives in one of these so an early
/// return at any step leaves nothing behind.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    armed: bool,
}

impl TempArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard and hand the path over to the caller.
    pub fn into_path(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed temp artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove temp artifact"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.flac");
        std::fs::write(&path, b"x").unwrap();

        drop(TempArtifact::new(path.clone()));
        assert!(!path.exists());

        // never created
        drop(TempArtifact::new(dir.path().join("missing")));
    }

    #[test]
    fn test_kept_artifact_survives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.flac");
        std::fs::write(&path, b"x").unwrap();

        let kept = TempArtifact::new(path.clone()).into_path();
        assert_eq!(kept, path);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_move_and_empty_dir_cleanup() {
        let root = tempfile::tempdir().unwrap();
        let sub = root.path().join("release");
        ensure_dir_all(&sub).await.unwrap();

        let from = root.path().join("a.tmp");
        tokio::fs::write(&from, b"audio").await.unwrap();
        let to = sub.join("a.flac");
        move_file(&from, &to).await.unwrap();
        assert!(!from.exists());
        assert_eq!(tokio::fs::read(&to).await.unwrap(), b"audio");

        remove_dir_if_empty(&sub, root.path()).await;
        assert!(sub.exists());

        tokio::fs::remove_file(&to).await.unwrap();
        remove_dir_if_empty(&sub, root.path()).await;
        assert!(!sub.exists());
        remove_dir_if_empty(root.path(), root.path()).await;
        assert!(root.path().exists());
    }
}
