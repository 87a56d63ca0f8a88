//! Import reference resolution with a two-level cache.
//!
//! Resolution turns a reference string plus a containing file into a
//! concrete workspace path. Results are cached per containing directory
//! and, for non-relative names, shared across every ancestor directory that
//! provably resolves the same way. Relative names are directory-specific
//! and cheap to recompute, so they only ever populate the per-directory
//! cache.

use std::collections::HashMap;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use dashmap::DashMap;

use solls_workspace::paths::combine_paths;
use solls_workspace::VirtualWorkspace;

/// Existence probes used by the resolver.
///
/// `directory_exists` is optional; hosts without structure knowledge return
/// `None` and the resolver assumes existence, avoiding false negatives.
pub trait ResolutionHost {
    fn file_exists(&self, path: &Utf8Path) -> bool;

    fn directory_exists(&self, path: &Utf8Path) -> Option<bool> {
        let _ = path;
        None
    }
}

impl ResolutionHost for VirtualWorkspace {
    fn file_exists(&self, path: &Utf8Path) -> bool {
        VirtualWorkspace::file_exists(self, path)
    }

    fn directory_exists(&self, path: &Utf8Path) -> Option<bool> {
        VirtualWorkspace::directory_exists(self, path)
    }
}

/// Outcome of resolving one reference. Immutable once produced.
///
/// An unresolved reference is not an error: `resolved` is `None` and
/// `failed_lookup_locations` records every path that was tried.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ResolutionResult {
    pub resolved: Option<Utf8PathBuf>,
    pub failed_lookup_locations: Vec<Utf8PathBuf>,
}

/// Whether a reference name is syntactically relative (`.` or `..` first
/// segment).
#[must_use]
pub fn is_relative_reference(name: &str) -> bool {
    name == "." || name == ".." || name.starts_with("./") || name.starts_with("../")
}

/// Two-level cache of resolution results.
///
/// The per-directory level answers "what does `name` mean in this exact
/// directory". The per-name level shares one answer across the ancestor
/// chain: when `x` resolves from `/a/b/c/d` to `/a/b/x.sol`, every ancestor
/// down to the common prefix `/a/b` must resolve `x` identically, so the
/// write propagates to `/a/b/c` and `/a/b` and stops there. Propagating
/// past the common prefix would be wrong, not just wasteful: a different,
/// closer `x.sol` might exist for directories above it.
#[derive(Default)]
pub struct ResolutionCache {
    by_directory: DashMap<Utf8PathBuf, HashMap<String, Arc<ResolutionResult>>>,
    by_name: DashMap<String, HashMap<Utf8PathBuf, Arc<ResolutionResult>>>,
}

impl ResolutionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, directory: &Utf8Path, name: &str) -> Option<Arc<ResolutionResult>> {
        if let Some(dir_cache) = self.by_directory.get(directory) {
            if let Some(result) = dir_cache.get(name) {
                return Some(Arc::clone(result));
            }
        }
        if !is_relative_reference(name) {
            if let Some(name_cache) = self.by_name.get(name) {
                if let Some(result) = name_cache.get(directory) {
                    return Some(Arc::clone(result));
                }
            }
        }
        None
    }

    pub fn set(&self, directory: &Utf8Path, name: &str, result: &Arc<ResolutionResult>) {
        self.by_directory
            .entry(directory.to_owned())
            .or_default()
            .insert(name.to_string(), Arc::clone(result));

        if is_relative_reference(name) {
            return;
        }

        let mut name_cache = self.by_name.entry(name.to_string()).or_default();
        if name_cache.contains_key(directory) {
            return;
        }
        name_cache.insert(directory.to_owned(), Arc::clone(result));

        let stop = result
            .resolved
            .as_deref()
            .and_then(|file| common_prefix(directory, file));
        let mut current = directory.to_owned();
        loop {
            let Some(parent) = current.parent().map(Utf8Path::to_owned) else {
                break;
            };
            if parent == current || name_cache.contains_key(&parent) {
                break;
            }
            name_cache.insert(parent.clone(), Arc::clone(result));
            current = parent;
            if Some(current.as_path()) == stop.as_deref() {
                break;
            }
        }
    }

    /// Drop every cached result. Coarse, but resolution is recomputed
    /// lazily so over-invalidation only costs repeated probes.
    pub fn clear(&self) {
        self.by_directory.clear();
        self.by_name.clear();
    }
}

/// Longest shared leading path of `directory` and the resolved file's own
/// directory, found by character comparison truncated at the last shared
/// separator.
fn common_prefix(directory: &Utf8Path, resolved_file: &Utf8Path) -> Option<Utf8PathBuf> {
    let resolution_dir = resolved_file.parent()?;
    let dir = directory.as_str().as_bytes();
    let res = resolution_dir.as_str().as_bytes();

    let mut i = 0;
    while i < dir.len().min(res.len()) && dir[i] == res[i] {
        i += 1;
    }

    let search_end = (i + 1).min(dir.len());
    let sep = directory.as_str()[..search_end].rfind('/')?;
    if sep == 0 {
        return None;
    }
    Some(Utf8PathBuf::from(&directory.as_str()[..sep]))
}

/// Resolve `name` against the file that contains it.
///
/// Checks the cache first when one is given, and stores the computed result
/// afterward.
pub fn resolve_module_name(
    name: &str,
    containing_file: &Utf8Path,
    host: &dyn ResolutionHost,
    cache: Option<&ResolutionCache>,
) -> Arc<ResolutionResult> {
    let directory = containing_file
        .parent()
        .unwrap_or_else(|| Utf8Path::new("/"));

    if let Some(cache) = cache {
        if let Some(hit) = cache.get(directory, name) {
            return hit;
        }
    }

    let result = Arc::new(resolve_uncached(name, directory, host));
    if let Some(cache) = cache {
        cache.set(directory, name, &result);
    }
    result
}

fn resolve_uncached(
    name: &str,
    containing_directory: &Utf8Path,
    host: &dyn ResolutionHost,
) -> ResolutionResult {
    let mut failed_lookup_locations = Vec::new();
    let resolved = if is_relative_reference(name) {
        let candidate = combine_paths(containing_directory, name);
        try_file(&candidate, &mut failed_lookup_locations, host)
    } else {
        // Package-style resolution is policy-defined (a manifest-driven
        // search path would slot in here); unresolved for now.
        None
    };
    ResolutionResult {
        resolved,
        failed_lookup_locations,
    }
}

/// Return the candidate if it exists, otherwise record the failed lookup.
///
/// When the candidate's parent directory is known to be absent the probe is
/// skipped and the location recorded as failed directly.
fn try_file(
    candidate: &Utf8Path,
    failed_lookup_locations: &mut Vec<Utf8PathBuf>,
    host: &dyn ResolutionHost,
) -> Option<Utf8PathBuf> {
    let parent_missing = candidate
        .parent()
        .is_some_and(|parent| !directory_probably_exists(parent, host));
    if !parent_missing && host.file_exists(candidate) {
        return Some(candidate.to_owned());
    }
    failed_lookup_locations.push(candidate.to_owned());
    None
}

fn directory_probably_exists(directory: &Utf8Path, host: &dyn ResolutionHost) -> bool {
    host.directory_exists(directory).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Host over a fixed file set that counts existence probes.
    struct CountingHost {
        files: HashSet<Utf8PathBuf>,
        probes: Mutex<Vec<Utf8PathBuf>>,
    }

    impl CountingHost {
        fn new(files: &[&str]) -> Self {
            Self {
                files: files.iter().map(Utf8PathBuf::from).collect(),
                probes: Mutex::new(Vec::new()),
            }
        }

        fn probe_count(&self) -> usize {
            self.probes.lock().unwrap().len()
        }
    }

    impl ResolutionHost for CountingHost {
        fn file_exists(&self, path: &Utf8Path) -> bool {
            self.probes.lock().unwrap().push(path.to_owned());
            self.files.contains(path)
        }

        fn directory_exists(&self, path: &Utf8Path) -> Option<bool> {
            let prefix = format!("{path}/");
            Some(self.files.iter().any(|f| f.as_str().starts_with(&prefix)))
        }
    }

    #[test]
    fn relative_reference_shapes() {
        assert!(is_relative_reference("./lib.sol"));
        assert!(is_relative_reference("../lib.sol"));
        assert!(is_relative_reference("."));
        assert!(!is_relative_reference("openzeppelin/token.sol"));
        assert!(!is_relative_reference(".hidden/lib.sol"));
    }

    #[test]
    fn resolves_relative_import_to_sibling() {
        let host = CountingHost::new(&["/ws/lib.sol"]);
        let result =
            resolve_module_name("./lib.sol", Utf8Path::new("/ws/main.sol"), &host, None);
        assert_eq!(result.resolved.as_deref(), Some(Utf8Path::new("/ws/lib.sol")));
        assert!(result.failed_lookup_locations.is_empty());
    }

    #[test]
    fn resolves_parent_directory_import() {
        let host = CountingHost::new(&["/ws/lib/safe.sol"]);
        let result = resolve_module_name(
            "../lib/safe.sol",
            Utf8Path::new("/ws/contracts/main.sol"),
            &host,
            None,
        );
        assert_eq!(
            result.resolved.as_deref(),
            Some(Utf8Path::new("/ws/lib/safe.sol"))
        );
    }

    #[test]
    fn missing_file_records_failed_lookup() {
        let host = CountingHost::new(&["/ws/lib.sol"]);
        let result =
            resolve_module_name("./gone.sol", Utf8Path::new("/ws/main.sol"), &host, None);
        assert_eq!(result.resolved, None);
        assert_eq!(
            result.failed_lookup_locations,
            vec![Utf8PathBuf::from("/ws/gone.sol")]
        );
    }

    #[test]
    fn absent_parent_directory_skips_the_probe() {
        let host = CountingHost::new(&["/ws/lib.sol"]);
        let result = resolve_module_name(
            "./nowhere/gone.sol",
            Utf8Path::new("/ws/main.sol"),
            &host,
            None,
        );
        assert_eq!(result.resolved, None);
        assert_eq!(
            result.failed_lookup_locations,
            vec![Utf8PathBuf::from("/ws/nowhere/gone.sol")]
        );
        assert_eq!(host.probe_count(), 0);
    }

    #[test]
    fn non_relative_reference_is_unresolved_extension_point() {
        let host = CountingHost::new(&["/ws/lib.sol"]);
        let result =
            resolve_module_name("pkg/token.sol", Utf8Path::new("/ws/main.sol"), &host, None);
        assert_eq!(result.resolved, None);
        assert_eq!(host.probe_count(), 0);
    }

    #[test]
    fn per_directory_cache_serves_repeat_lookups() {
        let host = CountingHost::new(&["/ws/lib.sol"]);
        let cache = ResolutionCache::new();

        let first =
            resolve_module_name("./lib.sol", Utf8Path::new("/ws/main.sol"), &host, Some(&cache));
        let probes = host.probe_count();
        let second = resolve_module_name(
            "./lib.sol",
            Utf8Path::new("/ws/other.sol"),
            &host,
            Some(&cache),
        );
        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(host.probe_count(), probes);
    }

    /// A name cache entry written while resolving a test name from a deep
    /// directory. Uses the cache directly since non-relative resolution is
    /// an extension point in the resolver itself.
    fn seed(cache: &ResolutionCache, directory: &str, resolved: &str) -> Arc<ResolutionResult> {
        let result = Arc::new(ResolutionResult {
            resolved: Some(Utf8PathBuf::from(resolved)),
            failed_lookup_locations: Vec::new(),
        });
        cache.set(Utf8Path::new(directory), "x", &result);
        result
    }

    #[test]
    fn propagation_covers_ancestors_up_to_common_prefix() {
        let cache = ResolutionCache::new();
        let result = seed(&cache, "/a/b/c/d", "/a/b/x.sol");

        for dir in ["/a/b/c/d", "/a/b/c", "/a/b"] {
            let hit = cache.get(Utf8Path::new(dir), "x");
            assert!(hit.is_some(), "expected cache hit for {dir}");
            assert!(Arc::ptr_eq(&hit.unwrap(), &result));
        }
        // Above the common prefix a different, closer x.sol could exist.
        assert!(cache.get(Utf8Path::new("/a"), "x").is_none());
    }

    #[test]
    fn propagation_stops_at_existing_entry() {
        let cache = ResolutionCache::new();
        let earlier = seed(&cache, "/a/b", "/a/b/x.sol");
        let later = seed(&cache, "/a/b/c/d/e", "/a/b/x.sol");

        // /a/b already had an entry; the later write must not clobber it.
        let hit = cache.get(Utf8Path::new("/a/b"), "x").unwrap();
        assert!(Arc::ptr_eq(&hit, &earlier));
        let hit = cache.get(Utf8Path::new("/a/b/c"), "x").unwrap();
        assert!(Arc::ptr_eq(&hit, &later));
    }

    #[test]
    fn unresolved_result_does_not_propagate_past_directory() {
        let cache = ResolutionCache::new();
        let result = Arc::new(ResolutionResult::default());
        cache.set(Utf8Path::new("/a/b/c"), "x", &result);

        // No resolved file means no common prefix; propagation walks to the
        // root, which is exactly "every ancestor resolves this the same way
        // (not at all)".
        assert!(cache.get(Utf8Path::new("/a/b"), "x").is_some());
        assert!(cache.get(Utf8Path::new("/a"), "x").is_some());
    }

    #[test]
    fn relative_names_stay_out_of_the_per_name_cache() {
        let cache = ResolutionCache::new();
        let result = Arc::new(ResolutionResult {
            resolved: Some(Utf8PathBuf::from("/a/b/lib.sol")),
            failed_lookup_locations: Vec::new(),
        });
        cache.set(Utf8Path::new("/a/b/c"), "./lib.sol", &result);

        assert!(cache.get(Utf8Path::new("/a/b/c"), "./lib.sol").is_some());
        assert!(cache.get(Utf8Path::new("/a/b"), "./lib.sol").is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = ResolutionCache::new();
        seed(&cache, "/a/b/c", "/a/b/x.sol");
        cache.clear();
        assert!(cache.get(Utf8Path::new("/a/b/c"), "x").is_none());
    }
}
