//! Synchronizes a file source into the virtual workspace.
//!
//! [`FileSystemUpdater`] deduplicates concurrent fetches: every in-flight or
//! completed fetch is a [`Shared`] future keyed by URI, so all callers for
//! the same resource await one underlying read and replay its result. A
//! caller dropping its handle never aborts the fetch for the callers still
//! awaiting it. Failed fetches are replaced on the next `ensure`, giving
//! retry semantics without ever caching an error.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Semaphore;
use url::Url;

use solls_workspace::paths::normalize_uri;
use solls_workspace::{FileSource, VirtualWorkspace};

/// Cloneable failure shared by every awaiter of one operation.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct FetchError(Arc<anyhow::Error>);

impl From<anyhow::Error> for FetchError {
    fn from(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }
}

/// Handle to one in-flight or completed fetch, awaitable by any number of
/// callers.
pub type FetchFuture = Shared<BoxFuture<'static, Result<(), FetchError>>>;

/// Whether a shared operation has already completed with an error.
///
/// Error records are kept in place until the next `ensure*` call looks at
/// them, which observes the failure and replaces the record. That is the
/// eviction the data model requires, done lazily.
pub(crate) fn completed_with_error(fut: &FetchFuture) -> bool {
    matches!(fut.peek(), Some(Err(_)))
}

pub struct FileSystemUpdater {
    source: Arc<dyn FileSource>,
    fs: Arc<VirtualWorkspace>,
    /// One fetch record per URI.
    fetches: DashMap<Url, FetchFuture>,
    /// Singleton record for "list all workspace files".
    structure_fetch: Mutex<Option<FetchFuture>>,
    /// Bounds total concurrent fetches. Backpressure, not correctness.
    limit: Arc<Semaphore>,
}

impl FileSystemUpdater {
    #[must_use]
    pub fn new(
        fs: Arc<VirtualWorkspace>,
        source: Arc<dyn FileSource>,
        concurrency: usize,
    ) -> Self {
        Self {
            source,
            fs,
            fetches: DashMap::new(),
            structure_fetch: Mutex::new(None),
            limit: Arc::new(Semaphore::new(concurrency)),
        }
    }

    /// Start a fetch for `uri`, replacing any existing record.
    pub fn fetch(&self, uri: &Url) -> FetchFuture {
        let uri = normalize_uri(uri);
        let fut = self.make_fetch(uri.clone());
        self.fetches.insert(uri, fut.clone());
        fut
    }

    /// Return the existing fetch record for `uri`, or start one.
    ///
    /// This is the dedup guarantee: at most one fetch per URI is ever in
    /// flight, and every concurrent caller observes the same result.
    pub fn ensure(&self, uri: &Url) -> FetchFuture {
        let uri = normalize_uri(uri);
        match self.fetches.entry(uri.clone()) {
            dashmap::Entry::Occupied(mut entry) => {
                if completed_with_error(entry.get()) {
                    let fut = self.make_fetch(uri);
                    entry.insert(fut.clone());
                    fut
                } else {
                    entry.get().clone()
                }
            }
            dashmap::Entry::Vacant(entry) => {
                let fut = self.make_fetch(uri);
                entry.insert(fut.clone());
                fut
            }
        }
    }

    /// Record `uri` as already synced, without touching the file source.
    ///
    /// Used when the client hands us authoritative content (`didOpen` /
    /// `didChange`): the workspace store already holds the text, so a later
    /// `ensure` must not overwrite it with a stale remote copy.
    pub fn mark_synced(&self, uri: &Url) {
        let uri = normalize_uri(uri);
        let fut: FetchFuture = async { Ok(()) }.boxed().shared();
        self.fetches.insert(uri, fut);
    }

    fn make_fetch(&self, uri: Url) -> FetchFuture {
        let source = Arc::clone(&self.source);
        let fs = Arc::clone(&self.fs);
        let limit = Arc::clone(&self.limit);
        async move {
            let _permit = limit
                .acquire_owned()
                .await
                .map_err(|_| FetchError::from(anyhow!("fetch limiter closed")))?;
            match source.read_file(&uri).await {
                Ok(text) => {
                    fs.add(&uri, Some(&text));
                    Ok(())
                }
                Err(err) => {
                    tracing::warn!("fetch of {uri} failed: {err:#}");
                    Err(FetchError::from(err))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Start a structure fetch, replacing any existing record.
    pub fn fetch_structure(&self) -> FetchFuture {
        let fut = self.make_structure_fetch();
        *self.structure_fetch.lock().unwrap() = Some(fut.clone());
        fut
    }

    /// Return the existing structure fetch record, or start one.
    pub fn ensure_structure(&self) -> FetchFuture {
        let mut slot = self.structure_fetch.lock().unwrap();
        match slot.as_ref() {
            Some(fut) if !completed_with_error(fut) => fut.clone(),
            _ => {
                let fut = self.make_structure_fetch();
                *slot = Some(fut.clone());
                fut
            }
        }
    }

    fn make_structure_fetch(&self) -> FetchFuture {
        let source = Arc::clone(&self.source);
        let fs = Arc::clone(&self.fs);
        async move {
            match source.list_files(None).await {
                Ok(uris) => {
                    for uri in &uris {
                        fs.add(uri, None);
                    }
                    fs.mark_structure_synced();
                    tracing::debug!("synced workspace structure, {} files", uris.len());
                    Ok(())
                }
                Err(err) => {
                    tracing::warn!("workspace structure fetch failed: {err:#}");
                    Err(FetchError::from(err))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Drop the fetch record for `uri`; the next `ensure` re-fetches.
    pub fn invalidate(&self, uri: &Url) {
        self.fetches.remove(&normalize_uri(uri));
    }

    /// Drop the structure fetch record; the next `ensure_structure`
    /// re-fetches.
    pub fn invalidate_structure(&self) {
        *self.structure_fetch.lock().unwrap() = None;
    }
}
