//! Hosted forge queries

pub mod github;

pub use github::{parse_repository_slug, GithubPulls};

use crate::error::PruneResult;
use async_trait::async_trait;

/// Source of open pull request numbers for a hosted repository
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    /// Numbers of every open pull request in `repository` (`owner/name`)
    async fn open_pull_numbers(&self, repository: &str) -> PruneResult<Vec<u64>>;
}
