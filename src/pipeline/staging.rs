//! Staging store: the on-disk holding area for the item in flight.
//!
//! Artifacts live as `<dir>/<page>.png`. Writes go to a temporary sibling
//! and are renamed into place, so a second `put` for the same index replaces
//! the first atomically. Only one item is staged at a time; the store must
//! be cleared (by backup or cleanup) before the next item starts.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension of staged artifacts.
pub const ARTIFACT_EXT: &str = "png";

/// One staged page artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    pub page: u32,
    pub path: PathBuf,
}

/// Ordered, overwrite-tolerant page artifact store backed by a directory.
#[derive(Debug, Clone)]
pub struct StagingStore {
    dir: PathBuf,
}

impl StagingStore {
    /// Open the store at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        debug!("Staging store at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the artifact for `page` is stored at.
    pub fn artifact_path(&self, page: u32) -> PathBuf {
        self.dir.join(format!("{page}.{ARTIFACT_EXT}"))
    }

    /// Store `bytes` as the artifact for `page`, replacing any earlier one.
    pub async fn put(&self, page: u32, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.artifact_path(page);
        let tmp = self.dir.join(format!(".{page}.{ARTIFACT_EXT}.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(path)
    }

    /// All artifacts, ascending by page index.
    ///
    /// Files whose stem is not a page index are ignored.
    pub async fn list_ordered(&self) -> io::Result<Vec<StagedArtifact>> {
        let mut artifacts = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if let Some(page) = page_index_of(&path) {
                artifacts.push(StagedArtifact { page, path });
            }
        }
        artifacts.sort_by_key(|a| a.page);
        Ok(artifacts)
    }

    /// Remove every file in the store. Returns how many were removed.
    pub async fn clear(&self) -> io::Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Whether the store holds no page artifacts.
    pub async fn is_empty(&self) -> io::Result<bool> {
        Ok(self.list_ordered().await?.is_empty())
    }

    /// Move every artifact into a fresh `unsaved-<label>` subdirectory.
    ///
    /// [`clear`](Self::clear) only removes top-level files, so the moved
    /// pages survive later cleanups until someone collects them.
    pub async fn set_aside(&self, label: &str) -> io::Result<PathBuf> {
        let mut target = self.dir.join(format!("unsaved-{label}"));
        let mut n = 2;
        while tokio::fs::try_exists(&target).await? {
            target = self.dir.join(format!("unsaved-{label}_{n}"));
            n += 1;
        }
        tokio::fs::create_dir(&target).await?;
        for artifact in self.list_ordered().await? {
            if let Some(name) = artifact.path.file_name() {
                tokio::fs::rename(&artifact.path, target.join(name)).await?;
            }
        }
        Ok(target)
    }

    /// Clear leftovers from an interrupted run.
    pub async fn discard_stale(&self) -> io::Result<usize> {
        let removed = self.clear().await?;
        if removed > 0 {
            warn!(
                "Removed {} stale file(s) from staging store {}",
                removed,
                self.dir.display()
            );
        }
        Ok(removed)
    }
}

fn page_index_of(path: &Path) -> Option<u32> {
    if path.extension()?.to_str()? != ARTIFACT_EXT {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok().filter(|&p| p >= 1)
}
