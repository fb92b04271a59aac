//! Object-store image cache
//!
//! [`ObjectStore`] is the thin collaborator boundary (paged LIST and DELETE);
//! [`ObjectStoreBucket`] turns it into an [`ImageCache`]. Object sizes are
//! accumulated during the single listing pass and reused by `has_headroom`,
//! so aggregate usage never needs a second LIST round.

use super::{format_bytes, CacheEntry, ImageCache};
use crate::error::{PruneError, PruneResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::{debug, info};

/// One object as reported by a LIST call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full object key, including the bucket prefix
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// One page of a LIST call
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectInfo>,
    /// Continuation token; `None` on the last page
    pub next_token: Option<String>,
}

/// Result of a DELETE call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The object was already gone (404)
    NotFound,
}

/// Paged LIST / DELETE against a bucket
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of objects under `prefix`
    async fn list_page(&self, prefix: &str, token: Option<String>) -> PruneResult<ObjectPage>;

    /// Delete `key`; a missing object is reported as [`DeleteOutcome::NotFound`]
    async fn delete_object(&self, key: &str) -> PruneResult<DeleteOutcome>;

    /// Bucket name for display
    fn bucket(&self) -> &str;
}

/// Image cache over the objects directly under a bucket prefix
pub struct ObjectStoreBucket<S> {
    store: S,
    prefix: String,
    quota_bytes: u64,
    /// Sizes from the last complete listing, keyed by entry name
    sizes: Mutex<Option<HashMap<String, u64>>>,
}

/// Iteration state of the lazy listing
struct Listing {
    token: Option<String>,
    pending: VecDeque<ObjectInfo>,
    exhausted: bool,
    sizes: HashMap<String, u64>,
}

impl<S: ObjectStore> ObjectStoreBucket<S> {
    /// Create a bucket cache over `prefix` with a total size quota
    pub fn new(store: S, prefix: impl Into<String>, quota_bytes: u64) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            quota_bytes,
            sizes: Mutex::new(None),
        }
    }

    fn entry_name<'a>(&self, key: &'a str) -> Option<&'a str> {
        let name = key.strip_prefix(self.prefix.as_str())?;
        // Nested keys belong to other prefixes
        (!name.is_empty() && !name.contains('/')).then_some(name)
    }

    fn lock_sizes(&self) -> std::sync::MutexGuard<'_, Option<HashMap<String, u64>>> {
        self.sizes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Total size of the cached listing, listing first if needed
    async fn total_bytes(&self) -> PruneResult<u64> {
        let cached: Option<u64> = self.lock_sizes().as_ref().map(|sizes| sizes.values().sum());
        if let Some(total) = cached {
            return Ok(total);
        }

        self.entries().try_for_each(|_| async { Ok(()) }).await?;

        self.lock_sizes()
            .as_ref()
            .map(|sizes| sizes.values().sum())
            .ok_or_else(|| PruneError::Internal("object listing did not record sizes".to_string()))
    }
}

#[async_trait]
impl<S: ObjectStore> ImageCache for ObjectStoreBucket<S> {
    fn entries(&self) -> BoxStream<'_, PruneResult<CacheEntry>> {
        let listing = Listing {
            token: None,
            pending: VecDeque::new(),
            exhausted: false,
            sizes: HashMap::new(),
        };

        stream::try_unfold(listing, move |mut listing| async move {
            loop {
                if let Some(object) = listing.pending.pop_front() {
                    let Some(name) = self.entry_name(&object.key) else {
                        debug!(key = %object.key, "skipping object outside prefix");
                        continue;
                    };
                    let name = name.to_string();
                    listing.sizes.insert(name.clone(), object.size);
                    let entry = CacheEntry {
                        name,
                        mtime: object.last_modified,
                        size: Some(object.size),
                    };
                    return Ok::<_, PruneError>(Some((entry, listing)));
                }

                if listing.exhausted {
                    debug!(objects = listing.sizes.len(), "object listing complete");
                    *self.lock_sizes() = Some(std::mem::take(&mut listing.sizes));
                    return Ok(None);
                }

                let page = self
                    .store
                    .list_page(&self.prefix, listing.token.take())
                    .await?;
                listing.exhausted = page.next_token.is_none();
                listing.token = page.next_token;
                listing.pending.extend(page.objects);
            }
        })
        .boxed()
    }

    async fn delete_entry(&self, name: &str) -> PruneResult<()> {
        let key = format!("{}{}", self.prefix, name);
        match self.store.delete_object(&key).await? {
            DeleteOutcome::Deleted => debug!(%key, "deleted object"),
            DeleteOutcome::NotFound => info!(%key, "object already gone"),
        }

        if let Some(sizes) = self.lock_sizes().as_mut() {
            sizes.remove(name);
        }
        Ok(())
    }

    async fn has_headroom(&self) -> PruneResult<bool> {
        let used = self.total_bytes().await?;
        debug!(
            used = %format_bytes(used),
            quota = %format_bytes(self.quota_bytes),
            "bucket usage"
        );
        Ok(used < self.quota_bytes)
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.store.bucket(), self.prefix)
    }
}
