//! In-memory mirror of a Solidity workspace.
//!
//! This crate owns the pieces that know what files exist and what they
//! contain: URI/path conversion ([`paths`]), the [`VirtualWorkspace`] store
//! that holds fetched content and structure, and the [`FileSource`] trait
//! abstracting where that content comes from (local disk or a remote
//! content provider).

pub mod fs;
pub mod paths;
mod vfs;

pub use fs::{FileSource, LocalFileSystem, MemoryFileSystem};
pub use paths::PathError;
pub use vfs::VirtualWorkspace;
