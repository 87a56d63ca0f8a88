//! Concurrent in-memory mirror of the workspace file tree.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use camino::Utf8Path;
use dashmap::DashMap;
use url::Url;

use crate::paths::{normalize_uri, url_to_path};

/// One file known to the workspace.
///
/// `text == None` means the file is known to exist (it appeared in a
/// structure listing) but its content has not been fetched yet.
#[derive(Clone, Debug)]
struct VirtualFile {
    text: Option<Arc<str>>,
}

/// In-memory mirror of the file tree: which URIs exist and what they
/// contain.
///
/// [`VirtualWorkspace`] is owned by the enclosing session; every other
/// component reads and writes file content through it rather than keeping
/// copies of its own. All keys are normalized with
/// [`normalize_uri`](crate::paths::normalize_uri), so callers may pass any
/// equivalent spelling of a URI.
#[derive(Debug, Default)]
pub struct VirtualWorkspace {
    files: DashMap<Url, VirtualFile>,
    /// Set once the full workspace structure has been synced; until then
    /// directory-existence probes answer "unknown" to avoid false negatives.
    structure_synced: AtomicBool,
}

impl VirtualWorkspace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file, optionally with content.
    ///
    /// Registering an already-known file without content never downgrades
    /// known content back to the unfetched state.
    pub fn add(&self, uri: &Url, text: Option<&str>) {
        let uri = normalize_uri(uri);
        match self.files.entry(uri) {
            dashmap::Entry::Occupied(mut entry) => {
                if let Some(text) = text {
                    entry.get_mut().text = Some(Arc::from(text));
                }
            }
            dashmap::Entry::Vacant(entry) => {
                entry.insert(VirtualFile {
                    text: text.map(Arc::from),
                });
            }
        }
    }

    /// Overwrite a file's content, registering it if unknown.
    pub fn update(&self, uri: &Url, text: &str) {
        let uri = normalize_uri(uri);
        self.files.insert(
            uri,
            VirtualFile {
                text: Some(Arc::from(text)),
            },
        );
    }

    /// Forget a file entirely.
    pub fn remove(&self, uri: &Url) {
        self.files.remove(&normalize_uri(uri));
    }

    /// Whether the URI is known to the workspace (fetched or merely listed).
    #[must_use]
    pub fn exists(&self, uri: &Url) -> bool {
        self.files.contains_key(&normalize_uri(uri))
    }

    /// Whether the URI is known *and* its content has been fetched.
    #[must_use]
    pub fn has_content(&self, uri: &Url) -> bool {
        self.files
            .get(&normalize_uri(uri))
            .is_some_and(|file| file.text.is_some())
    }

    /// Read a file's content.
    ///
    /// Errors if the URI is unknown or its content has not been fetched.
    pub fn read(&self, uri: &Url) -> Result<Arc<str>> {
        let uri = normalize_uri(uri);
        let file = self
            .files
            .get(&uri)
            .ok_or_else(|| anyhow!("unknown file: {uri}"))?;
        file.text
            .clone()
            .ok_or_else(|| anyhow!("content not fetched for {uri}"))
    }

    /// All URIs currently known to the workspace.
    #[must_use]
    pub fn uris(&self) -> Vec<Url> {
        self.files.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Mark the workspace structure as fully synced from the file source.
    pub fn mark_structure_synced(&self) {
        self.structure_synced.store(true, Ordering::SeqCst);
    }

    /// Existence probe keyed by path, for the module resolver.
    #[must_use]
    pub fn file_exists(&self, path: &Utf8Path) -> bool {
        crate::paths::path_to_url(path).is_ok_and(|uri| self.exists(&uri))
    }

    /// Directory existence probe keyed by path.
    ///
    /// Returns `None` until the structure has been synced: before that the
    /// store cannot distinguish "directory absent" from "directory not yet
    /// listed", and a false negative would make the resolver skip probes for
    /// files that do exist.
    #[must_use]
    pub fn directory_exists(&self, path: &Utf8Path) -> Option<bool> {
        if !self.structure_synced.load(Ordering::SeqCst) {
            return None;
        }
        let prefix = format!("{}/", path.as_str().trim_end_matches('/'));
        let found = self.files.iter().any(|entry| {
            url_to_path(entry.key()).is_ok_and(|p| p.as_str().starts_with(&prefix))
        });
        Some(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn read_unknown_uri_is_an_error() {
        let ws = VirtualWorkspace::new();
        assert!(ws.read(&uri("file:///missing.sol")).is_err());
    }

    #[test]
    fn add_without_content_registers_existence_only() {
        let ws = VirtualWorkspace::new();
        let u = uri("file:///a.sol");
        ws.add(&u, None);
        assert!(ws.exists(&u));
        assert!(!ws.has_content(&u));
        assert!(ws.read(&u).is_err());
    }

    #[test]
    fn add_without_content_does_not_clobber_content() {
        let ws = VirtualWorkspace::new();
        let u = uri("file:///a.sol");
        ws.add(&u, Some("contract A {}"));
        ws.add(&u, None);
        assert_eq!(&*ws.read(&u).unwrap(), "contract A {}");
    }

    #[test]
    fn update_overwrites_content() {
        let ws = VirtualWorkspace::new();
        let u = uri("file:///a.sol");
        ws.add(&u, Some("v1"));
        ws.update(&u, "v2");
        assert_eq!(&*ws.read(&u).unwrap(), "v2");
    }

    #[test]
    fn remove_forgets_the_file() {
        let ws = VirtualWorkspace::new();
        let u = uri("file:///a.sol");
        ws.add(&u, Some("x"));
        ws.remove(&u);
        assert!(!ws.exists(&u));
    }

    #[test]
    fn equivalent_uri_spellings_hit_the_same_entry() {
        let ws = VirtualWorkspace::new();
        ws.add(&uri("file:///dir/a%2Db.sol"), Some("x"));
        assert!(ws.exists(&uri("file:///dir/a-b.sol")));
    }

    #[test]
    fn file_exists_by_path() {
        let ws = VirtualWorkspace::new();
        ws.add(&uri("file:///ws/lib.sol"), None);
        assert!(ws.file_exists(Utf8Path::new("/ws/lib.sol")));
        assert!(!ws.file_exists(Utf8Path::new("/ws/other.sol")));
    }

    #[test]
    fn directory_exists_is_unknown_before_structure_sync() {
        let ws = VirtualWorkspace::new();
        ws.add(&uri("file:///ws/lib.sol"), None);
        assert_eq!(ws.directory_exists(Utf8Path::new("/ws")), None);

        ws.mark_structure_synced();
        assert_eq!(ws.directory_exists(Utf8Path::new("/ws")), Some(true));
        assert_eq!(ws.directory_exists(Utf8Path::new("/elsewhere")), Some(false));
    }
}
