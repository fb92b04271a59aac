//! Configuration schema for image-prune
//!
//! Configuration is stored at `~/.config/image-prune/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Local image cache settings
    pub cache: CacheConfig,

    /// Object store settings
    pub s3: S3Config,

    /// Local checkout scanned for keepers
    pub repo: RepoConfig,

    /// Hosted repository scanned for open pull requests and branches
    pub remote: RemoteConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Local cache and expiry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Image directory used when neither --directory nor --s3 is given
    pub directory: Option<PathBuf>,

    /// Images older than this many days are deleted unless kept
    pub max_age_days: u32,

    /// Prune further while the filesystem has less than this many GB free
    pub min_free_gb: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_age_days: 14,
            min_free_gb: 15,
        }
    }
}

impl CacheConfig {
    /// Configured directory, or `<cache_dir>/vm-images`
    pub fn directory_or_default(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("vm-images")
        })
    }
}

/// Object store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Prune further while the bucket prefix holds at least this many bytes
    pub quota_bytes: u64,

    /// Region passed to the SDK
    pub region: String,

    /// Endpoint override for S3-compatible stores
    pub endpoint: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            quota_bytes: 500 * 1024 * 1024 * 1024,
            region: "us-east-1".to_string(),
            endpoint: None,
        }
    }
}

/// Local checkout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Path of the git checkout
    pub path: PathBuf,

    /// Directory holding image symlinks inside the checkout
    pub images_dir: String,

    /// `for-each-ref` patterns selecting local branches to protect
    pub branch_patterns: Vec<String>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            images_dir: "images".to_string(),
            branch_patterns: vec!["refs/heads/".to_string()],
        }
    }
}

/// Hosted repository settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// `owner/name`; derived from the `origin` remote when unset
    pub repository: Option<String>,

    /// URL to fetch from; defaults to `<github_web_url>/<repository>`
    pub fetch_url: Option<String>,

    /// GitHub REST API root
    pub github_api_url: String,

    /// GitHub web root used to build fetch URLs
    pub github_web_url: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            repository: None,
            fetch_url: None,
            github_api_url: "https://api.github.com".to_string(),
            github_web_url: "https://github.com".to_string(),
        }
    }
}
