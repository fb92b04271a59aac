//! Keeper computation over a checkout and, optionally, a remote mirror
//!
//! A keeper is either the target of a symlink under the images directory at
//! the head commit, or an identifier added by a branch relative to its merge
//! base with head. Any scan failure aborts the whole computation: a partial
//! keeper set would under-protect live images.

use super::KeeperSet;
use crate::error::PruneResult;
use crate::forge::PullRequestSource;
use crate::git::{mirror, Git, RemoteMirror};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// Hosted repository to mirror
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    /// URL handed to `git fetch`
    pub fetch_url: String,
    /// `owner/name` used to list open pull requests
    pub repository: String,
}

/// Remote half of a keeper scan
pub struct RemoteScan<'a> {
    pub target: &'a RemoteTarget,
    pub pulls: &'a dyn PullRequestSource,
}

/// Builds the keeper set
#[derive(Debug, Clone)]
pub struct KeeperScanner {
    images_dir: String,
    branch_patterns: Vec<String>,
}

impl KeeperScanner {
    /// Scanner looking at `images_dir` and local refs matching `branch_patterns`
    pub fn new(images_dir: &str, branch_patterns: Vec<String>) -> Self {
        let images_dir = format!("{}/", images_dir.trim_end_matches('/'));
        Self {
            images_dir,
            branch_patterns,
        }
    }

    /// Union of keepers from `head` in `repo`, its branches when
    /// `include_branches` is set, and the remote when `remote` is given
    #[instrument(skip(self, repo, remote), fields(repo = %repo.path().display()))]
    pub async fn compute_keepers(
        &self,
        repo: &Git,
        head: &str,
        include_branches: bool,
        remote: Option<RemoteScan<'_>>,
    ) -> PruneResult<KeeperSet> {
        let mut keepers = HashSet::new();

        let patterns: Vec<&str> = self.branch_patterns.iter().map(String::as_str).collect();
        self.scan(repo, head, include_branches.then_some(patterns.as_slice()), &mut keepers)
            .await?;

        if let Some(remote) = remote {
            self.scan_remote(remote, include_branches, &mut keepers)
                .await?;
        }

        info!(count = keepers.len(), "keeper set computed");
        Ok(keepers.into_iter().collect())
    }

    async fn scan_remote(
        &self,
        remote: RemoteScan<'_>,
        include_branches: bool,
        keepers: &mut HashSet<String>,
    ) -> PruneResult<()> {
        let pulls = remote
            .pulls
            .open_pull_numbers(&remote.target.repository)
            .await?;
        info!(
            repository = %remote.target.repository,
            open_pulls = pulls.len(),
            "scanning remote"
        );

        let mirror = RemoteMirror::fetch(&remote.target.fetch_url, &pulls).await?;
        let patterns = RemoteMirror::branch_patterns();
        self.scan(
            mirror.git(),
            mirror::HEAD_REF,
            include_branches.then_some(patterns.as_slice()),
            keepers,
        )
        .await?;
        mirror.close();
        Ok(())
    }

    /// Symlink targets at `head`, plus identifiers added on each ref matching
    /// `branch_patterns`
    async fn scan(
        &self,
        git: &Git,
        head: &str,
        branch_patterns: Option<&[&str]>,
        keepers: &mut HashSet<String>,
    ) -> PruneResult<()> {
        let targets = git.list_symlink_targets(head, &self.images_dir).await?;
        debug!(%head, count = targets.len(), "symlinked images");
        keepers.extend(targets);

        let Some(patterns) = branch_patterns else {
            return Ok(());
        };
        if patterns.is_empty() {
            return Ok(());
        }

        for branch in git.for_each_ref(patterns).await? {
            let added = git
                .diff_added_identifiers(head, &branch, &self.images_dir)
                .await?;
            if !added.is_empty() {
                debug!(%branch, ?added, "images added on branch");
            }
            keepers.extend(added);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PruneError;
    use crate::git::testutil::{commit_symlink, init_repo};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedPulls(Vec<u64>);

    #[async_trait]
    impl PullRequestSource for FixedPulls {
        async fn open_pull_numbers(&self, _repository: &str) -> PruneResult<Vec<u64>> {
            Ok(self.0.clone())
        }
    }

    struct FailingPulls;

    #[async_trait]
    impl PullRequestSource for FailingPulls {
        async fn open_pull_numbers(&self, _repository: &str) -> PruneResult<Vec<u64>> {
            Err(PruneError::RemoteScan("api unavailable".to_string()))
        }
    }

    fn scanner() -> KeeperScanner {
        KeeperScanner::new("images", vec!["refs/heads/".to_string()])
    }

    /// `main` links a-111; `feature` additionally adds b-222
    async fn repo_with_feature_branch(path: &std::path::Path) -> Git {
        let git = init_repo(path).await;
        commit_symlink(&git, "alpha", "a-111.qcow2").await;
        git.run(&["checkout", "--quiet", "-b", "feature"]).await.unwrap();
        commit_symlink(&git, "beta", "b-222.qcow2").await;
        git.run(&["checkout", "--quiet", "main"]).await.unwrap();
        git
    }

    #[tokio::test]
    async fn head_symlinks_only() {
        let temp = TempDir::new().unwrap();
        let git = repo_with_feature_branch(temp.path()).await;

        let keepers = scanner()
            .compute_keepers(&git, "HEAD", false, None)
            .await
            .unwrap();

        assert_eq!(keepers.sorted(), vec!["a-111.qcow2"]);
    }

    #[tokio::test]
    async fn branches_add_new_images() {
        let temp = TempDir::new().unwrap();
        let git = repo_with_feature_branch(temp.path()).await;

        let keepers = scanner()
            .compute_keepers(&git, "HEAD", true, None)
            .await
            .unwrap();

        assert_eq!(keepers.sorted(), vec!["a-111.qcow2", "b-222.qcow2"]);
    }

    #[tokio::test]
    async fn replaced_symlink_keeps_both_revisions() {
        let temp = TempDir::new().unwrap();
        let git = init_repo(temp.path()).await;
        commit_symlink(&git, "alpha", "a-111.qcow2").await;
        git.run(&["checkout", "--quiet", "-b", "bump"]).await.unwrap();
        commit_symlink(&git, "alpha", "a-112.qcow2").await;
        git.run(&["checkout", "--quiet", "main"]).await.unwrap();

        let keepers = scanner()
            .compute_keepers(&git, "HEAD", true, None)
            .await
            .unwrap();

        assert_eq!(keepers.sorted(), vec!["a-111.qcow2", "a-112.qcow2"]);
    }

    #[tokio::test]
    async fn missing_images_dir_is_git_error() {
        let temp = TempDir::new().unwrap();
        let git = init_repo(temp.path()).await;
        commit_symlink(&git, "alpha", "a-111.qcow2").await;

        let err = KeeperScanner::new("no-such-dir", Vec::new())
            .compute_keepers(&git, "HEAD", false, None)
            .await
            .unwrap_err();

        assert!(matches!(err, PruneError::GitInvocation { .. }));
    }

    #[tokio::test]
    async fn remote_branches_and_pulls_are_kept() {
        let upstream_dir = TempDir::new().unwrap();
        let upstream = repo_with_feature_branch(upstream_dir.path()).await;
        git_pull_ref(&upstream, 3, "gamma", "c-333.qcow2").await;

        let local_dir = TempDir::new().unwrap();
        let local = init_repo(local_dir.path()).await;
        commit_symlink(&local, "alpha", "a-111.qcow2").await;

        let target = RemoteTarget {
            fetch_url: upstream_dir.path().to_str().unwrap().to_string(),
            repository: "acme/vm-images".to_string(),
        };
        let pulls = FixedPulls(vec![3]);
        let remote = RemoteScan {
            target: &target,
            pulls: &pulls,
        };

        let keepers = scanner()
            .compute_keepers(&local, "HEAD", true, Some(remote))
            .await
            .unwrap();

        assert_eq!(
            keepers.sorted(),
            vec!["a-111.qcow2", "b-222.qcow2", "c-333.qcow2"]
        );
    }

    #[tokio::test]
    async fn pull_listing_failure_aborts_scan() {
        let temp = TempDir::new().unwrap();
        let git = repo_with_feature_branch(temp.path()).await;
        let target = RemoteTarget {
            fetch_url: temp.path().to_str().unwrap().to_string(),
            repository: "acme/vm-images".to_string(),
        };
        let remote = RemoteScan {
            target: &target,
            pulls: &FailingPulls,
        };

        let err = scanner()
            .compute_keepers(&git, "HEAD", true, Some(remote))
            .await
            .unwrap_err();

        assert!(matches!(err, PruneError::RemoteScan(_)));
    }

    /// Publish a commit adding `link -> target` only as `refs/pull/<n>/head`
    async fn git_pull_ref(git: &Git, number: u64, link: &str, target: &str) {
        git.run(&["checkout", "--quiet", "-b", "pr-work"]).await.unwrap();
        commit_symlink(git, link, target).await;
        let pull_ref = format!("refs/pull/{number}/head");
        git.run(&["update-ref", &pull_ref, "HEAD"]).await.unwrap();
        git.run(&["checkout", "--quiet", "main"]).await.unwrap();
        git.run(&["branch", "--quiet", "-D", "pr-work"]).await.unwrap();
    }
}
