//! GitHub REST client for open pull requests
//!
//! Uses the blocking `ureq` agent on the blocking pool. Requests are
//! unauthenticated.

use super::PullRequestSource;
use crate::error::{PruneError, PruneResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Page size requested from the pulls endpoint
const PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct PullSummary {
    number: u64,
}

/// Lists open pull requests via `GET /repos/{owner}/{name}/pulls`
#[derive(Debug, Clone)]
pub struct GithubPulls {
    api_url: String,
}

impl GithubPulls {
    /// Client rooted at `api_url` (e.g. `https://api.github.com`)
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn fetch_all(api_url: &str, repository: &str) -> PruneResult<Vec<u64>> {
        let agent = ureq::Agent::new_with_defaults();
        let mut numbers = Vec::new();

        for page in 1.. {
            let url = format!(
                "{api_url}/repos/{repository}/pulls?state=open&per_page={PER_PAGE}&page={page}"
            );
            let pulls: Vec<PullSummary> = agent
                .get(&url)
                .header("Accept", "application/vnd.github+json")
                .header("User-Agent", concat!("image-prune/", env!("CARGO_PKG_VERSION")))
                .call()
                .and_then(|mut resp| resp.body_mut().read_json())
                .map_err(|e| PruneError::RemoteScan(format!("listing pull requests: {e}")))?;

            let count = pulls.len();
            numbers.extend(pulls.into_iter().map(|p| p.number));
            if count < PER_PAGE {
                break;
            }
        }

        Ok(numbers)
    }
}

#[async_trait]
impl PullRequestSource for GithubPulls {
    #[instrument(skip(self))]
    async fn open_pull_numbers(&self, repository: &str) -> PruneResult<Vec<u64>> {
        let api_url = self.api_url.clone();
        let repository = repository.to_string();

        let numbers = tokio::task::spawn_blocking(move || Self::fetch_all(&api_url, &repository))
            .await
            .map_err(|e| PruneError::Internal(format!("pull request task failed: {e}")))??;

        debug!(count = numbers.len(), "open pull requests");
        Ok(numbers)
    }
}

/// Extract `owner/name` from a GitHub remote URL.
///
/// Accepts `https://github.com/owner/name(.git)`, `ssh://git@github.com/owner/name`
/// and scp-like `git@github.com:owner/name.git`.
pub fn parse_repository_slug(url: &str) -> Option<String> {
    let url = url.trim();
    let path = if let Some((_, rest)) = url.split_once("://") {
        rest.split_once('/')?.1
    } else {
        url.split_once(':')?.1
    };

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let (owner, name) = path.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some(format!("{owner}/{name}"))
}
