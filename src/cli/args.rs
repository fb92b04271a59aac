//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser};
use std::path::PathBuf;

/// image-prune - garbage collect cached CI test VM images
///
/// Deletes images that are not referenced from the checkout, its branches,
/// origin branches or open pull requests, oldest first, when they are
/// expired or the cache is short on space.
#[derive(Parser, Debug)]
#[command(name = "image-prune")]
#[command(author, version, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Delete every image that is not a keeper, regardless of age or space
    #[arg(long)]
    pub force: bool,

    /// Report what would be deleted without deleting anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Only protect images linked from the checkout's HEAD
    #[arg(long)]
    pub checkout_only: bool,

    /// Skip scanning origin branches and open pull requests
    #[arg(long)]
    pub offline: bool,

    /// Git checkout to scan for keepers
    #[arg(long, value_name = "DIR")]
    pub repo: Option<PathBuf>,

    /// Hosted repository as OWNER/NAME (default: derived from origin)
    #[arg(long, value_name = "OWNER/NAME")]
    pub remote_repo: Option<String>,

    /// Print the prune report as JSON
    #[arg(long)]
    pub json: bool,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = "IMAGE_PRUNE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Cache backend selection
#[derive(Args, Debug, Default)]
#[group(multiple = false)]
pub struct BackendArgs {
    /// Local image directory (default: configured cache directory)
    #[arg(long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Object store location (s3://bucket/prefix/ or https://host/bucket/prefix/)
    #[arg(long, value_name = "URL")]
    pub s3: Option<String>,
}

impl Cli {
    /// Whether origin branches and open pull requests are scanned
    pub fn scan_remote(&self) -> bool {
        !self.checkout_only && !self.offline
    }
}
