//! Configuration management for image-prune

pub mod schema;

pub use schema::Config;

use crate::error::{PruneError, PruneResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;
use tracing::debug;

/// Local free-space floor in GB
pub const ENV_MIN_FREE_GB: &str = "IMAGE_PRUNE_MIN_FREE_GB";
/// Object store quota in bytes
pub const ENV_S3_QUOTA_BYTES: &str = "IMAGE_PRUNE_S3_QUOTA_BYTES";
/// Expiry age in days
pub const ENV_MAX_AGE_DAYS: &str = "IMAGE_PRUNE_MAX_AGE_DAYS";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("image-prune")
            .join("config.toml")
    }

    /// Load configuration, falling back to defaults if the file is missing,
    /// then apply environment overrides
    pub async fn load(&self) -> PruneResult<Config> {
        let mut config = if self.config_path.exists() {
            self.load_from_file(&self.config_path).await?
        } else {
            debug!("Config file not found, using defaults");
            Config::default()
        };

        apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> PruneResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PruneError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| PruneError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Override thresholds from environment variables.
///
/// `lookup` abstracts the environment so callers can inject values.
pub fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> PruneResult<()> {
    if let Some(gb) = parse_env(&lookup, ENV_MIN_FREE_GB)? {
        config.cache.min_free_gb = gb;
    }
    if let Some(bytes) = parse_env(&lookup, ENV_S3_QUOTA_BYTES)? {
        config.s3.quota_bytes = bytes;
    }
    if let Some(days) = parse_env(&lookup, ENV_MAX_AGE_DAYS)? {
        config.cache.max_age_days = days;
    }
    Ok(())
}

fn parse_env<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> PruneResult<Option<T>> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }

    value.parse().map(Some).map_err(|_| PruneError::EnvInvalid {
        var: var.to_string(),
        value: raw.clone(),
    })
}
