//! File sources: where workspace content actually comes from.
//!
//! A [`FileSource`] supplies two operations: enumerate all workspace file
//! URIs under a base, and fetch the text of one URI. The fetch coordinator
//! in `solls-project` synchronizes a source into the
//! [`VirtualWorkspace`](crate::VirtualWorkspace); nothing else talks to the
//! source directly.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use dashmap::DashMap;
use ignore::WalkBuilder;
use url::Url;

use crate::paths::{normalize_uri, path_to_url, url_to_path};

/// Provider of workspace structure and file content.
///
/// Either backed by the local disk ([`LocalFileSystem`]) or by a remote
/// content provider. Both operations may fail; failures surface to the
/// fetch coordinator, never crash it.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Enumerate all workspace file URIs, optionally restricted to `base`.
    async fn list_files(&self, base: Option<&Url>) -> Result<Vec<Url>>;

    /// Fetch the text content of one file.
    async fn read_file(&self, uri: &Url) -> Result<String>;
}

/// Whether a URI names a Solidity source file.
#[must_use]
pub fn is_solidity_file(uri: &Url) -> bool {
    uri.path().ends_with(".sol")
}

/// Whether a URI names a package manifest.
///
/// Manifests determine the module structure of the workspace, so they are
/// fetched eagerly by `ensure_module_structure`.
#[must_use]
pub fn is_package_manifest(uri: &Url) -> bool {
    uri.path().ends_with("/package.json")
}

/// [`FileSource`] backed by the local disk.
pub struct LocalFileSystem {
    root: Utf8PathBuf,
}

impl LocalFileSystem {
    #[must_use]
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl FileSource for LocalFileSystem {
    async fn list_files(&self, base: Option<&Url>) -> Result<Vec<Url>> {
        let root = match base {
            Some(base) => url_to_path(base)?,
            None => self.root.clone(),
        };
        // Directory walking is blocking I/O; keep it off the async workers.
        let uris = tokio::task::spawn_blocking(move || walk_source_files(&root))
            .await
            .context("workspace enumeration task failed")??;
        tracing::debug!("enumerated {} workspace files", uris.len());
        Ok(uris)
    }

    async fn read_file(&self, uri: &Url) -> Result<String> {
        let path = url_to_path(uri)?;
        tokio::fs::read_to_string(path.as_std_path())
            .await
            .with_context(|| format!("failed to read {path}"))
    }
}

/// Walk `root` and collect Solidity sources and package manifests.
///
/// Hidden files and `.gitignore` rules are respected, matching how the rest
/// of the toolchain decides what belongs to a workspace.
fn walk_source_files(root: &Utf8Path) -> Result<Vec<Url>> {
    let mut uris = Vec::new();
    for entry in WalkBuilder::new(root.as_std_path()).build() {
        let entry = entry.context("workspace enumeration failed")?;
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let Some(path) = Utf8Path::from_path(entry.path()) else {
            continue;
        };
        let uri = path_to_url(path)?;
        if is_solidity_file(&uri) || is_package_manifest(&uri) {
            uris.push(uri);
        }
    }
    uris.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    Ok(uris)
}

/// Map-backed [`FileSource`].
///
/// Stands in for a remote content provider and backs tests; the read
/// counter lets callers assert how many underlying fetches a scenario
/// performed.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: DashMap<Url, String>,
    reads: AtomicUsize,
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file with its content.
    pub fn insert(&self, uri: &Url, text: &str) {
        self.files.insert(normalize_uri(uri), text.to_string());
    }

    pub fn remove(&self, uri: &Url) {
        self.files.remove(&normalize_uri(uri));
    }

    /// Number of `read_file` calls served so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSource for MemoryFileSystem {
    async fn list_files(&self, base: Option<&Url>) -> Result<Vec<Url>> {
        let prefix = base.map(|b| normalize_uri(b).as_str().to_string());
        let mut uris: Vec<Url> = self
            .files
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|uri| {
                prefix
                    .as_deref()
                    .is_none_or(|p| uri.as_str().starts_with(p))
            })
            .collect();
        uris.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(uris)
    }

    async fn read_file(&self, uri: &Url) -> Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(&normalize_uri(uri))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| anyhow!("file not found: {uri}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn memory_source_counts_reads() {
        let source = MemoryFileSystem::new();
        source.insert(&uri("file:///a.sol"), "contract A {}");

        assert_eq!(source.reads(), 0);
        let text = source.read_file(&uri("file:///a.sol")).await.unwrap();
        assert_eq!(text, "contract A {}");
        assert_eq!(source.reads(), 1);
    }

    #[tokio::test]
    async fn memory_source_read_of_missing_file_fails() {
        let source = MemoryFileSystem::new();
        assert!(source.read_file(&uri("file:///missing.sol")).await.is_err());
    }

    #[tokio::test]
    async fn memory_source_lists_under_base() {
        let source = MemoryFileSystem::new();
        source.insert(&uri("file:///ws/a.sol"), "");
        source.insert(&uri("file:///ws/sub/b.sol"), "");
        source.insert(&uri("file:///other/c.sol"), "");

        let all = source.list_files(None).await.unwrap();
        assert_eq!(all.len(), 3);

        let under = source
            .list_files(Some(&uri("file:///ws/")))
            .await
            .unwrap();
        assert_eq!(under.len(), 2);
    }

    #[tokio::test]
    async fn local_source_lists_solidity_files_and_manifests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Token.sol"), "contract Token {}").unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let source = LocalFileSystem::new(root);
        let uris = source.list_files(None).await.unwrap();

        let names: Vec<&str> = uris
            .iter()
            .filter_map(|u| u.path_segments().and_then(Iterator::last))
            .collect();
        assert!(names.contains(&"Token.sol"));
        assert!(names.contains(&"package.json"));
        assert!(!names.contains(&"notes.txt"));
    }

    #[tokio::test]
    async fn local_source_reads_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("A.sol");
        std::fs::write(&file, "pragma solidity ^0.8.0;").unwrap();

        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let source = LocalFileSystem::new(root);
        let file_uri = path_to_url(Utf8Path::from_path(&file).unwrap()).unwrap();

        let text = source.read_file(&file_uri).await.unwrap();
        assert_eq!(text, "pragma solidity ^0.8.0;");
    }
}
