//! image-prune - CI test VM image garbage collector
//!
//! Computes the set of images still referenced from a git checkout, its
//! branches, origin branches and open pull requests, then prunes everything
//! else from a local image directory or an object-store bucket when it is
//! expired or the cache is short on space.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod forge;
pub mod git;
pub mod image;
pub mod keepers;
pub mod prune;

pub use error::{PruneError, PruneResult};
