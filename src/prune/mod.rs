//! Eviction policy
//!
//! One linear pass over the cache, oldest entry first. An entry is deleted
//! only when it has a recognized image extension, is not a keeper, and is
//! either forced, past its expiry age, or the cache lacks headroom. Headroom
//! is re-read for each candidate so deletions that relieve pressure stop
//! further pressure-driven deletes.

use crate::cache::{CacheEntry, ImageCache};
use crate::error::PruneResult;
use crate::image;
use crate::keepers::KeeperSet;
use chrono::{DateTime, Duration, Utc};
use futures_util::TryStreamExt;
use serde::Serialize;
use tracing::{debug, info, instrument};

/// Age-based expiry policy
#[derive(Debug, Clone, Copy)]
pub struct PrunePolicy {
    /// Entries older than this are expired
    pub max_age: Duration,
}

impl PrunePolicy {
    pub fn from_days(days: u32) -> Self {
        Self {
            max_age: Duration::days(i64::from(days)),
        }
    }
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self::from_days(14)
    }
}

/// Per-run switches
#[derive(Debug, Clone, Copy, Default)]
pub struct PruneOptions {
    /// Delete every non-keeper image regardless of age or headroom
    pub force: bool,
    /// Report deletions without performing them
    pub dry_run: bool,
}

/// What happened to one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Delete,
    Retain,
}

/// Why an entry was kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetainReason {
    /// Not a `.qcow2`, `.iso`, `.tar.gz` or `.partial` file
    UnrecognizedExtension,
    /// Referenced from the keeper set
    Keeper,
    /// Not expired and the cache has headroom
    Fresh,
}

/// Decision for one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    #[serde(flatten)]
    pub entry: CacheEntry,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RetainReason>,
}

impl Decision {
    fn delete(entry: CacheEntry) -> Self {
        Self {
            entry,
            action: Action::Delete,
            reason: None,
        }
    }

    fn retain(entry: CacheEntry, reason: RetainReason) -> Self {
        Self {
            entry,
            action: Action::Retain,
            reason: Some(reason),
        }
    }
}

/// Outcome of a prune pass, decisions in processing order
#[derive(Debug, Clone, Serialize)]
pub struct PruneReport {
    pub cache: String,
    pub dry_run: bool,
    pub decisions: Vec<Decision>,
    /// Not forced and the cache still lacks headroom after the pass
    pub pressure_remains: bool,
}

impl PruneReport {
    /// Entries deleted (or that would be, on a dry run)
    pub fn deleted(&self) -> impl Iterator<Item = &CacheEntry> {
        self.decisions
            .iter()
            .filter(|d| d.action == Action::Delete)
            .map(|d| &d.entry)
    }

    /// Entries retained, with the reason
    pub fn retained(&self) -> impl Iterator<Item = (&CacheEntry, RetainReason)> {
        self.decisions
            .iter()
            .filter_map(|d| d.reason.map(|r| (&d.entry, r)))
    }

    /// Bytes freed by deleted entries whose size is known
    pub fn freed_bytes(&self) -> u64 {
        self.deleted().filter_map(|e| e.size).sum()
    }
}

/// Applies a [`PrunePolicy`] to an [`ImageCache`]
#[derive(Debug, Clone)]
pub struct Pruner {
    policy: PrunePolicy,
    now: DateTime<Utc>,
}

impl Pruner {
    pub fn new(policy: PrunePolicy) -> Self {
        Self {
            policy,
            now: Utc::now(),
        }
    }

    /// Evaluate expiry against a fixed clock
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Run one pass over `cache`.
    ///
    /// A failed delete aborts the pass; entries already deleted stay deleted.
    #[instrument(skip_all, fields(cache = %cache.describe(), force = options.force, dry_run = options.dry_run))]
    pub async fn prune(
        &self,
        cache: &dyn ImageCache,
        keepers: &KeeperSet,
        options: PruneOptions,
    ) -> PruneResult<PruneReport> {
        let expiry = self.now - self.policy.max_age;

        let mut entries: Vec<CacheEntry> = cache.entries().try_collect().await?;
        entries.sort_by_key(|e| e.mtime);
        debug!(count = entries.len(), %expiry, "listed cache entries");

        let mut decisions = Vec::with_capacity(entries.len());
        for entry in entries {
            if !image::has_image_extension(&entry.name) {
                debug!(name = %entry.name, "skipping unrecognized file");
                decisions.push(Decision::retain(entry, RetainReason::UnrecognizedExtension));
                continue;
            }
            if keepers.contains(&entry.name) {
                debug!(name = %entry.name, "keeping referenced image");
                decisions.push(Decision::retain(entry, RetainReason::Keeper));
                continue;
            }
            if !options.force && entry.mtime > expiry && cache.has_headroom().await? {
                debug!(name = %entry.name, "keeping fresh image");
                decisions.push(Decision::retain(entry, RetainReason::Fresh));
                continue;
            }

            info!(name = %entry.name, mtime = %entry.mtime, dry_run = options.dry_run, "pruning image");
            if !options.dry_run {
                cache.delete_entry(&entry.name).await?;
            }
            decisions.push(Decision::delete(entry));
        }

        let pressure_remains = !options.force && !cache.has_headroom().await?;
        Ok(PruneReport {
            cache: cache.describe(),
            dry_run: options.dry_run,
            decisions,
            pressure_remains,
        })
    }
}
