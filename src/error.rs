//! Error types for image-prune
//!
//! All modules use `PruneResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for image-prune operations
pub type PruneResult<T> = Result<T, PruneError>;

/// All errors that can occur while scanning keepers or pruning a cache
#[derive(Error, Debug)]
pub enum PruneError {
    // Git errors
    #[error("git command failed: {command}: {stderr}")]
    GitInvocation { command: String, stderr: String },

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Remote state errors
    #[error("Remote keeper scan failed: {0}")]
    RemoteScan(String),

    #[error("Cannot determine remote repository: {0}")]
    RemoteUnknown(String),

    // Backend errors
    #[error("Object store {operation} failed: {reason}")]
    ObjectStore { operation: String, reason: String },

    #[error("Invalid backend URL '{url}': {reason}")]
    InvalidBackendUrl { url: String, reason: String },

    #[error("Insufficient space in {cache} after pruning")]
    InsufficientSpaceAfterPrune { cache: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid value for {var}: '{value}'")]
    EnvInvalid { var: String, value: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PruneError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a git invocation error from a failed command's stderr
    pub fn git(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::GitInvocation {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an object store error
    pub fn object_store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ObjectStore {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::GitInvocation { .. } => {
                Some("Run from a git checkout that contains the images/ directory, or pass --repo")
            }
            Self::RemoteScan(_) => {
                Some("Pass --offline to skip scanning open pull requests and origin branches")
            }
            Self::RemoteUnknown(_) => {
                Some("Pass --remote-repo OWNER/NAME, or --offline to skip the remote scan")
            }
            Self::InsufficientSpaceAfterPrune { .. } => {
                Some("Run with --force to delete every image that is not a keeper")
            }
            Self::CommandFailed { .. } => Some("Make sure git is installed and on PATH"),
            _ => None,
        }
    }
}
