//! Scratch-space naming and best-effort cleanup.
//!
//! Every acquisition writes into local scratch storage under a name derived
//! from a request-scoped unique identifier (a content id or a fresh random
//! token), never a fixed constant. Two concurrent messages therefore never
//! touch the same path.
//!
//! Ownership of a scratch file passes to [`release_file`] once a delivery
//! has been attempted; release is best-effort and failures are only logged.

use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// A scratch directory that hands out request-scoped unique paths.
#[derive(Debug, Clone)]
pub struct Scratch {
    root: PathBuf,
}

impl Scratch {
    /// Create a scratch space rooted at `root`. The directory is created
    /// lazily by [`Scratch::ensure`] / [`Scratch::unique_dir`].
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this scratch space.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make sure the root directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn ensure(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// A fresh file path under the root, unique per call.
    #[must_use]
    pub fn unique_file(&self, prefix: &str, extension: &str) -> PathBuf {
        let token = Uuid::new_v4().as_simple().to_string();
        self.root.join(format!("{prefix}_{token}.{extension}"))
    }

    /// A file path keyed by a request-derived content identifier.
    ///
    /// Safe under concurrency as long as the identifier itself is unique
    /// per piece of content (two requests for the same content overwrite
    /// with identical bytes).
    #[must_use]
    pub fn keyed_file(&self, key: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{key}.{extension}"))
    }

    /// Create and return a fresh per-request subdirectory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn unique_dir(&self, prefix: &str) -> std::io::Result<PathBuf> {
        let token = Uuid::new_v4().as_simple().to_string();
        let dir = self.root.join(format!("{prefix}_{token}"));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

/// Best-effort delete of a scratch file. Failure is logged, never escalated.
pub async fn release_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(path = %path.display(), "Released scratch file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Scratch file already gone")
        }
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to release scratch file"),
    }
}

/// Best-effort removal of a now-empty per-request directory.
///
/// Silently ignores non-empty or missing directories.
pub async fn remove_dir_if_empty(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            // Non-empty directories land here too; nothing to do.
            tracing::debug!(path = %path.display(), error = %e, "Left scratch directory in place");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_unique_file_names_pairwise_distinct() {
        let scratch = Scratch::new("scratch-test");
        let names: HashSet<PathBuf> = (0..1000).map(|_| scratch.unique_file("clip", "mp4")).collect();
        assert_eq!(names.len(), 1000);
    }

    #[tokio::test]
    async fn test_release_file_is_best_effort() {
        // Releasing a missing file must not panic or error out.
        release_file(Path::new("does/not/exist.mp4")).await;
    }

    #[tokio::test]
    async fn test_unique_dir_created_and_distinct() -> std::io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let scratch = Scratch::new(tmp.path());
        let a = scratch.unique_dir("req").await?;
        let b = scratch.unique_dir("req").await?;
        assert_ne!(a, b);
        assert!(a.is_dir());
        assert!(b.is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn test_release_then_tidy_removes_request_dir() -> std::io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let scratch = Scratch::new(tmp.path());
        let dir = scratch.unique_dir("req").await?;
        let file = dir.join("00.jpg");
        tokio::fs::write(&file, b"jpeg").await?;

        release_file(&file).await;
        remove_dir_if_empty(&dir).await;

        assert!(!file.exists());
        assert!(!dir.exists());
        Ok(())
    }
}
