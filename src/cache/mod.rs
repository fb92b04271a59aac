//! Image cache backends
//!
//! An image cache is a collection of named, timestamped, sized blobs. The
//! pruner only talks to the [`ImageCache`] capability set, so a new backend
//! is added by implementing the trait rather than by branching in the policy.
//!
//! | Backend | Entries | Headroom signal |
//! |---------|---------|-----------------|
//! | [`LocalDirectory`] | regular files in a directory | free bytes on the filesystem |
//! | [`ObjectStoreBucket`] | objects under a bucket prefix | summed object sizes vs. quota |

pub mod local;
pub mod object_store;
pub mod s3;

pub use local::LocalDirectory;
pub use object_store::{DeleteOutcome, ObjectInfo, ObjectPage, ObjectStore, ObjectStoreBucket};
pub use s3::{S3Location, S3Store};

use crate::error::PruneResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::Serialize;

/// One stored image artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    /// Image identifier (file name or object key relative to the prefix)
    pub name: String,
    /// Last modification time
    pub mtime: DateTime<Utc>,
    /// Size in bytes, when the backend exposes it while listing
    pub size: Option<u64>,
}

/// Capability interface shared by every cache backend
#[async_trait]
pub trait ImageCache: Send + Sync {
    /// List all entries.
    ///
    /// The stream is finite and single-pass; network backends may fetch
    /// pages lazily as it is polled.
    fn entries(&self) -> BoxStream<'_, PruneResult<CacheEntry>>;

    /// Delete the entry named `name`
    async fn delete_entry(&self, name: &str) -> PruneResult<()>;

    /// Whether no space-freeing action is currently required
    async fn has_headroom(&self) -> PruneResult<bool>;

    /// Human-readable location for reports and errors
    fn describe(&self) -> String;
}

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Convert GB to bytes
pub fn gb_to_bytes(gb: u32) -> u64 {
    u64::from(gb) * 1024 * 1024 * 1024
}
