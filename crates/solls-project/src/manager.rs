//! Project-level orchestration: dependency discovery, document lifecycle,
//! and bulk workspace priming.
//!
//! [`ProjectManager`] is the surface the protocol layer talks to. It owns
//! the virtual workspace, the fetch coordinator, the resolution cache, and
//! the per-file referenced-files cache, and guarantees that a query for a
//! file's transitive imports leaves every reachable file fetched.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use dashmap::DashMap;
use futures::future::{try_join_all, BoxFuture, FutureExt, Shared};
use url::Url;

use solls_conf::Settings;
use solls_workspace::fs::{is_package_manifest, is_solidity_file};
use solls_workspace::paths::{normalize_uri, path_to_url, url_to_path};
use solls_workspace::{FileSource, VirtualWorkspace};

use crate::resolve::{resolve_module_name, ResolutionCache};
use crate::scan::ImportExtractor;
use crate::sync::{completed_with_error, FetchError, FetchFuture, FileSystemUpdater};
use crate::versions::Versions;

/// Handle to one in-flight or completed referenced-files computation.
///
/// Same dedup discipline as content fetches: at most one computation per
/// source URI, shared by all callers, evicted on error or invalidation.
type ReferencesFuture = Shared<BoxFuture<'static, Result<Arc<Vec<Url>>, FetchError>>>;

pub struct ProjectManager {
    root: Utf8PathBuf,
    fs: Arc<VirtualWorkspace>,
    updater: Arc<FileSystemUpdater>,
    resolution_cache: Arc<ResolutionCache>,
    extractor: Arc<dyn ImportExtractor>,
    versions: Arc<Versions>,
    /// Per-source-URI cache of "files referenced by this URI".
    referenced_files: Arc<DashMap<Url, ReferencesFuture>>,
    ensured_module_structure: Mutex<Option<FetchFuture>>,
    ensured_all_files: Mutex<Option<FetchFuture>>,
    ensured_own_files: Mutex<Option<FetchFuture>>,
    max_import_depth: usize,
}

impl ProjectManager {
    #[must_use]
    pub fn new(
        root: Utf8PathBuf,
        source: Arc<dyn FileSource>,
        extractor: Arc<dyn ImportExtractor>,
        settings: &Settings,
    ) -> Self {
        let fs = Arc::new(VirtualWorkspace::new());
        let updater = Arc::new(FileSystemUpdater::new(
            Arc::clone(&fs),
            source,
            settings.fetch_concurrency,
        ));
        Self {
            root,
            fs,
            updater,
            resolution_cache: Arc::new(ResolutionCache::new()),
            extractor,
            versions: Arc::new(Versions::new()),
            referenced_files: Arc::new(DashMap::new()),
            ensured_module_structure: Mutex::new(None),
            ensured_all_files: Mutex::new(None),
            ensured_own_files: Mutex::new(None),
            max_import_depth: settings.max_import_depth,
        }
    }

    /// Read handle on the workspace store, for downstream consumers that
    /// need raw content.
    #[must_use]
    pub fn fs(&self) -> &Arc<VirtualWorkspace> {
        &self.fs
    }

    #[must_use]
    pub fn versions(&self) -> &Arc<Versions> {
        &self.versions
    }

    #[must_use]
    pub fn root(&self) -> &Utf8PathBuf {
        &self.root
    }

    /// Client opened a file. Open and change are handled identically.
    pub fn did_open(&self, uri: &Url, text: &str) {
        let uri = normalize_uri(uri);
        if !self.fs.exists(&uri) {
            // A file joined the project; downstream project-wide caches
            // are stale, and previously failed resolutions may now land
            // on the new file.
            self.versions.bump_project();
            self.resolution_cache.clear();
        }
        self.did_change(&uri, text);
    }

    /// Client changed a file's content.
    pub fn did_change(&self, uri: &Url, text: &str) {
        let uri = normalize_uri(uri);
        self.fs.update(&uri, text);
        // Client content is authoritative; a later ensure must not clobber
        // it with a remote copy.
        self.updater.mark_synced(&uri);
        self.versions.bump_file(&uri);
        self.invalidate_referenced_files(Some(&uri));
        tracing::debug!(
            "didChange {uri} -> version {}",
            self.versions.file_version(&uri)
        );
    }

    /// Client saved a file. Content is unchanged, nothing to invalidate.
    pub fn did_save(&self, uri: &Url) {
        tracing::debug!("didSave {}", normalize_uri(uri));
    }

    /// Client closed a file. Content stays cached, but the version bump
    /// tells downstream consumers to treat derived state as unverified.
    pub fn did_close(&self, uri: &Url) {
        let uri = normalize_uri(uri);
        self.versions.bump_file(&uri);
        self.invalidate_referenced_files(Some(&uri));
    }

    /// Ensure the module structure of the workspace is known: the file
    /// listing plus the content of every package manifest.
    ///
    /// Shared and replayable; re-fetched only after a failure.
    pub fn ensure_module_structure(&self) -> FetchFuture {
        shared_op(&self.ensured_module_structure, || {
            let updater = Arc::clone(&self.updater);
            let fs = Arc::clone(&self.fs);
            let versions = Arc::clone(&self.versions);
            let referenced_files = Arc::clone(&self.referenced_files);
            let resolution_cache = Arc::clone(&self.resolution_cache);
            async move {
                updater.ensure_structure().await?;
                let manifests: Vec<FetchFuture> = fs
                    .uris()
                    .into_iter()
                    .filter(is_package_manifest)
                    .map(|uri| updater.ensure(&uri))
                    .collect();
                try_join_all(manifests).await?;
                // The file set is established; prior reference discovery
                // and resolution may have run against partial structure.
                versions.bump_project();
                resolution_cache.clear();
                referenced_files.clear();
                Ok(())
            }
            .boxed()
            .shared()
        })
    }

    /// Fetch every Solidity file and manifest in the workspace, including
    /// dependencies under `node_modules`.
    pub fn ensure_all_files(&self) -> FetchFuture {
        shared_op(&self.ensured_all_files, || {
            self.make_bulk_fetch(|uri| is_solidity_file(uri) || is_package_manifest(uri))
        })
    }

    /// Fetch every Solidity file and manifest outside `node_modules`.
    pub fn ensure_own_files(&self) -> FetchFuture {
        shared_op(&self.ensured_own_files, || {
            self.make_bulk_fetch(|uri| {
                !uri.path().contains("/node_modules/")
                    && (is_solidity_file(uri) || is_package_manifest(uri))
            })
        })
    }

    fn make_bulk_fetch(&self, filter: impl Fn(&Url) -> bool + Send + 'static) -> FetchFuture {
        let updater = Arc::clone(&self.updater);
        let fs = Arc::clone(&self.fs);
        async move {
            updater.ensure_structure().await?;
            let fetches: Vec<FetchFuture> = fs
                .uris()
                .into_iter()
                .filter(|uri| filter(uri))
                .map(|uri| updater.ensure(&uri))
                .collect();
            try_join_all(fetches).await?;
            Ok(())
        }
        .boxed()
        .shared()
    }

    /// Recursively ensure that `uri` and everything it transitively imports
    /// is fetched, and return the discovered dependency closure.
    ///
    /// A broken import never aborts the rest of the closure: failures below
    /// the root are logged and treated as "no further dependencies."
    pub async fn ensure_referenced_files(&self, uri: &Url) -> Result<Vec<Url>, FetchError> {
        let uri = normalize_uri(uri);
        self.ensure_module_structure().await?;
        let mut visited = HashSet::new();
        let mut discovered = Vec::new();
        self.walk(uri, self.max_import_depth, &mut visited, &mut discovered)
            .await?;
        Ok(discovered)
    }

    fn walk<'a>(
        &'a self,
        uri: Url,
        max_depth: usize,
        visited: &'a mut HashSet<Url>,
        discovered: &'a mut Vec<Url>,
    ) -> BoxFuture<'a, Result<(), FetchError>> {
        async move {
            visited.insert(uri.clone());
            if max_depth == 0 {
                return Ok(());
            }
            let referenced = self.resolve_referenced_files(&uri).await?;
            for referenced_uri in referenced.iter() {
                // Cycle guard: a file cannot be rediscovered as its own
                // transitive dependency.
                if visited.contains(referenced_uri) {
                    continue;
                }
                discovered.push(referenced_uri.clone());
                if let Err(err) = self
                    .walk(referenced_uri.clone(), max_depth - 1, visited, discovered)
                    .await
                {
                    tracing::error!(
                        "error resolving file references for {referenced_uri}: {err}"
                    );
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// The files directly referenced by `uri`, resolved to URIs.
    ///
    /// Computed at most once per URI: concurrent callers share one in-flight
    /// computation, and the completed result replays until invalidated.
    fn resolve_referenced_files(&self, uri: &Url) -> ReferencesFuture {
        let uri = normalize_uri(uri);
        match self.referenced_files.entry(uri.clone()) {
            dashmap::Entry::Occupied(mut entry) => {
                if matches!(entry.get().peek(), Some(Err(_))) {
                    let fut = self.make_references_future(uri);
                    entry.insert(fut.clone());
                    fut
                } else {
                    entry.get().clone()
                }
            }
            dashmap::Entry::Vacant(entry) => {
                let fut = self.make_references_future(uri);
                entry.insert(fut.clone());
                fut
            }
        }
    }

    fn make_references_future(&self, uri: Url) -> ReferencesFuture {
        let ensured = self.updater.ensure(&uri);
        let fs = Arc::clone(&self.fs);
        let extractor = Arc::clone(&self.extractor);
        let cache = Arc::clone(&self.resolution_cache);
        async move {
            ensured.await?;
            let text = fs.read(&uri).map_err(FetchError::from)?;
            let containing_file = url_to_path(&uri)
                .map_err(|err| FetchError::from(anyhow::Error::from(err)))?;

            let mut referenced = Vec::new();
            for import in extractor.extract_imports(&text) {
                let result =
                    resolve_module_name(&import, &containing_file, fs.as_ref(), Some(&cache));
                match &result.resolved {
                    Some(path) => {
                        let resolved_uri = path_to_url(path)
                            .map_err(|err| FetchError::from(anyhow::Error::from(err)))?;
                        referenced.push(normalize_uri(&resolved_uri));
                    }
                    None => {
                        // Resolution miss: not an error, just no further
                        // dependency along this edge.
                        tracing::debug!(
                            "unresolved import {import:?} in {uri}, tried {:?}",
                            result.failed_lookup_locations
                        );
                    }
                }
            }
            Ok(Arc::new(referenced))
        }
        .boxed()
        .shared()
    }

    /// Drop the cached referenced-files sequence for one URI, or all of
    /// them, so the next discovery reflects current content.
    pub fn invalidate_referenced_files(&self, uri: Option<&Url>) {
        match uri {
            Some(uri) => {
                self.referenced_files.remove(&normalize_uri(uri));
            }
            None => self.referenced_files.clear(),
        }
    }
}

/// Return the cached singleton operation, or build and cache a new one.
///
/// Operations that completed with an error are replaced, which is the
/// evict-on-error lifecycle for the bulk `ensure*` records.
fn shared_op(
    slot: &Mutex<Option<FetchFuture>>,
    make: impl FnOnce() -> FetchFuture,
) -> FetchFuture {
    let mut slot = slot.lock().unwrap();
    match slot.as_ref() {
        Some(fut) if !completed_with_error(fut) => fut.clone(),
        _ => {
            let fut = make();
            *slot = Some(fut.clone());
            fut
        }
    }
}
