//! Git access: plumbing wrappers and the disposable remote mirror

pub mod commands;
pub mod mirror;

pub use commands::{Git, TreeEntry};
pub use mirror::RemoteMirror;
