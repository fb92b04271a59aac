//! CLI command implementations

pub mod prune;

pub use prune::execute as prune;
