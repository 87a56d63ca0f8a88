//! Workspace synchronization and module resolution for the Solidity
//! language server.
//!
//! The flow: an editor event updates the virtual workspace through
//! [`ProjectManager`]; a query calls
//! [`ProjectManager::ensure_referenced_files`], which uses the
//! [`FileSystemUpdater`] to guarantee referenced files are present and the
//! [`ResolutionCache`] to turn import strings into concrete files without
//! re-deriving known results.

pub mod manager;
pub mod resolve;
pub mod scan;
pub mod sync;
pub mod versions;

pub use manager::ProjectManager;
pub use resolve::{
    is_relative_reference, resolve_module_name, ResolutionCache, ResolutionHost, ResolutionResult,
};
pub use scan::{ImportExtractor, SolidityImportScanner};
pub use sync::{FetchError, FetchFuture, FileSystemUpdater};
pub use versions::Versions;
