//! Throwaway mirror of a hosted repository's refs.
//!
//! The mirror lives in a fresh temporary directory owned by [`RemoteMirror`].
//! Dropping the mirror removes the directory on every path, so a failed fetch
//! or scan never leaves refs or objects behind, and the caller's own checkout
//! is never touched.

use super::commands::Git;
use crate::error::{PruneError, PruneResult};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Local ref holding the remote's default branch
pub const HEAD_REF: &str = "refs/heads/head";
/// Local ref prefix for the remote's branches
pub const ORIGIN_PREFIX: &str = "refs/remotes/origin/";
/// Local ref prefix for open pull request heads
pub const PULL_PREFIX: &str = "refs/remotes/pr/";

/// A disposable repository holding `head`, `origin/*` and `pr/*` refs
pub struct RemoteMirror {
    dir: TempDir,
    git: Git,
}

impl RemoteMirror {
    /// Create the mirror and fetch the remote refs plus `pulls` in one round trip
    pub async fn fetch(url: &str, pulls: &[u64]) -> PruneResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("image-prune-mirror-")
            .tempdir()
            .map_err(|e| PruneError::io("creating mirror directory", e))?;

        let git = Git::init(dir.path()).await?;
        let refspecs = refspecs(pulls);

        info!(%url, pulls = pulls.len(), "fetching remote refs");
        git.fetch(url, &refspecs)
            .await
            .map_err(|e| PruneError::RemoteScan(format!("fetching {url}: {e}")))?;

        debug!(path = %dir.path().display(), "mirror ready");
        Ok(Self { dir, git })
    }

    /// Git handle on the mirror
    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Patterns selecting the mirrored branch and pull request refs
    pub fn branch_patterns() -> [&'static str; 2] {
        [ORIGIN_PREFIX, PULL_PREFIX]
    }

    /// Remove the mirror now, logging instead of failing on cleanup errors
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), error = %e, "failed to remove mirror directory");
        }
    }
}

/// Refspecs mapping `HEAD`, every branch and each open pull request
fn refspecs(pulls: &[u64]) -> Vec<String> {
    let mut specs = vec![
        format!("+HEAD:{HEAD_REF}"),
        format!("+refs/heads/*:{ORIGIN_PREFIX}*"),
    ];
    specs.extend(
        pulls
            .iter()
            .map(|n| format!("+refs/pull/{n}/head:{PULL_PREFIX}{n}")),
    );
    specs
}
