//! Local directory image cache
//!
//! Entries are the regular files directly inside the cache directory.
//! Symlinks are never entries. Headroom compares the free bytes on the
//! containing filesystem against a configured floor.

use super::{format_bytes, CacheEntry, ImageCache};
use crate::error::{PruneError, PruneResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, ReadDir};
use tracing::debug;

/// Image cache backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    path: PathBuf,
    min_free_bytes: u64,
}

impl LocalDirectory {
    /// Create a cache over `path` that wants at least `min_free_bytes` free
    pub fn new(path: impl Into<PathBuf>, min_free_bytes: u64) -> Self {
        Self {
            path: path.into(),
            min_free_bytes,
        }
    }

    /// The cache directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn next_file(&self, read_dir: &mut ReadDir) -> PruneResult<Option<CacheEntry>> {
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| PruneError::io(format!("reading {}", self.path.display()), e))?
        {
            // DirEntry::metadata does not follow symlinks
            let meta = entry.metadata().await.map_err(|e| {
                PruneError::io(format!("stat {}", entry.path().display()), e)
            })?;
            if !meta.file_type().is_file() {
                continue;
            }

            // Lossy names would not round-trip through delete_entry
            let Ok(name) = entry.file_name().into_string() else {
                debug!(path = %entry.path().display(), "skipping non-UTF-8 file name");
                continue;
            };

            let modified = meta.modified().map_err(|e| {
                PruneError::io(format!("mtime of {}", entry.path().display()), e)
            })?;

            return Ok(Some(CacheEntry {
                name,
                mtime: DateTime::<Utc>::from(modified),
                size: Some(meta.len()),
            }));
        }
        Ok(None)
    }
}

#[async_trait]
impl ImageCache for LocalDirectory {
    fn entries(&self) -> BoxStream<'_, PruneResult<CacheEntry>> {
        stream::try_unfold(None::<ReadDir>, move |state| async move {
            let mut read_dir = match state {
                Some(read_dir) => read_dir,
                None => match fs::read_dir(&self.path).await {
                    Ok(read_dir) => read_dir,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        debug!(path = %self.path.display(), "cache directory does not exist");
                        return Ok(None);
                    }
                    Err(e) => {
                        return Err(PruneError::io(
                            format!("opening {}", self.path.display()),
                            e,
                        ))
                    }
                },
            };

            let next = self.next_file(&mut read_dir).await?;
            Ok::<_, PruneError>(next.map(|entry| (entry, Some(read_dir))))
        })
        .boxed()
    }

    async fn delete_entry(&self, name: &str) -> PruneResult<()> {
        let path = self.path.join(name);
        fs::remove_file(&path)
            .await
            .map_err(|e| PruneError::io(format!("removing {}", path.display()), e))?;
        debug!(path = %path.display(), "removed image");
        Ok(())
    }

    async fn has_headroom(&self) -> PruneResult<bool> {
        let probe = existing_ancestor(&self.path);
        let free = free_bytes(&probe)
            .map_err(|e| PruneError::io(format!("statvfs {}", probe.display()), e))?;

        debug!(
            free = %format_bytes(free),
            floor = %format_bytes(self.min_free_bytes),
            "local free space"
        );
        Ok(free >= self.min_free_bytes)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Walk up from `path` to the first directory that exists
fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Bytes available to unprivileged users on the filesystem holding `path`
fn free_bytes(path: &Path) -> io::Result<u64> {
    fs4::available_space(path)
}
