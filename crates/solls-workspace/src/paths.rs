//! Path and URI conversion utilities.
//!
//! Every component keys its maps by URI, so two spellings of the same
//! resource must compare equal. [`normalize_uri`] canonicalizes the
//! percent-encoding of every path segment; [`url_to_path`] and
//! [`path_to_url`] convert between `file://` URIs and workspace paths
//! without touching the disk.

use camino::{Utf8Path, Utf8PathBuf};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use url::Url;

/// A URI or path did not have the shape the caller is required to guarantee.
///
/// These are caller bugs, not runtime conditions to retry, and are always
/// propagated.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("cannot resolve non-file URI to a path: {0}")]
    NotFileUri(Url),
    #[error("{0} is not an absolute path")]
    NotAbsolute(Utf8PathBuf),
    #[error("path is not valid UTF-8: {0}")]
    NotUtf8(String),
}

/// Characters left unescaped in a path segment, matching JavaScript's
/// `encodeURIComponent`.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Normalize the percent-encoding of a URI so that equal resources compare
/// equal.
///
/// Each path segment is decoded and re-encoded with a single canonical
/// escape set, so `file:///a%2Db.sol` and `file:///a-b.sol` normalize to the
/// same URI.
#[must_use]
pub fn normalize_uri(uri: &Url) -> Url {
    let mut normalized = uri.clone();
    let path: String = uri
        .path()
        .split('/')
        .map(|segment| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            utf8_percent_encode(&decoded, SEGMENT).to_string()
        })
        .collect::<Vec<_>>()
        .join("/");
    normalized.set_path(&path);
    normalized
}

/// Convert a `file://` URI to an absolute workspace path.
pub fn url_to_path(uri: &Url) -> Result<Utf8PathBuf, PathError> {
    if uri.scheme() != "file" {
        return Err(PathError::NotFileUri(uri.clone()));
    }
    let decoded = percent_decode_str(uri.path())
        .decode_utf8()
        .map_err(|_| PathError::NotUtf8(uri.path().to_string()))?;
    Ok(Utf8PathBuf::from(decoded.as_ref()))
}

/// Convert an absolute path to a `file://` URI.
///
/// Unlike canonicalization-based conversions this never consults the disk,
/// so it works for paths that only exist on a remote file source.
pub fn path_to_url(path: &Utf8Path) -> Result<Url, PathError> {
    if !path.is_absolute() {
        return Err(PathError::NotAbsolute(path.to_owned()));
    }
    Url::from_file_path(path.as_std_path())
        .map_err(|()| PathError::NotAbsolute(path.to_owned()))
}

/// Collapse `.` and `..` segments and duplicate separators.
///
/// `..` at the root is dropped rather than preserved; the resolver only ever
/// normalizes absolute candidate paths.
#[must_use]
pub fn normalize_path(path: &Utf8Path) -> Utf8PathBuf {
    let absolute = path.as_str().starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.as_str().split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute {
        Utf8PathBuf::from(format!("/{joined}"))
    } else {
        Utf8PathBuf::from(joined)
    }
}

/// Join a reference string onto a directory and normalize the result.
#[must_use]
pub fn combine_paths(directory: &Utf8Path, reference: &str) -> Utf8PathBuf {
    let reference_path = Utf8Path::new(reference);
    if reference_path.is_absolute() {
        return normalize_path(reference_path);
    }
    normalize_path(&directory.join(reference_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_to_path_basic() {
        let url = Url::parse("file:///workspace/contracts/Token.sol").unwrap();
        assert_eq!(
            url_to_path(&url).unwrap(),
            Utf8PathBuf::from("/workspace/contracts/Token.sol")
        );
    }

    #[test]
    fn url_to_path_decodes_percent_encoding() {
        let url = Url::parse("file:///home/user/my%20file.sol").unwrap();
        assert_eq!(
            url_to_path(&url).unwrap(),
            Utf8PathBuf::from("/home/user/my file.sol")
        );
    }

    #[test]
    fn url_to_path_rejects_non_file_scheme() {
        let url = Url::parse("https://example.com/file.sol").unwrap();
        assert!(matches!(
            url_to_path(&url),
            Err(PathError::NotFileUri(_))
        ));
    }

    #[test]
    fn path_to_url_rejects_relative_paths() {
        let path = Utf8PathBuf::from("contracts/Token.sol");
        assert!(matches!(
            path_to_url(&path),
            Err(PathError::NotAbsolute(_))
        ));
    }

    #[test]
    fn path_url_round_trip() {
        let path = Utf8PathBuf::from("/home/user/test file.sol");
        let url = path_to_url(&path).unwrap();
        assert_eq!(url_to_path(&url).unwrap(), path);
    }

    #[test]
    fn normalize_uri_is_stable_across_spellings() {
        let encoded = Url::parse("file:///a%2Db/x.sol").unwrap();
        let plain = Url::parse("file:///a-b/x.sol").unwrap();
        assert_eq!(normalize_uri(&encoded), normalize_uri(&plain));
    }

    #[test]
    fn normalize_uri_encodes_special_characters() {
        let url = Url::parse("file:///dir/a%20b.sol").unwrap();
        assert_eq!(normalize_uri(&url).as_str(), "file:///dir/a%20b.sol");
    }

    #[test]
    fn normalize_path_collapses_dot_segments() {
        assert_eq!(
            normalize_path(Utf8Path::new("/a/b/./c/../d.sol")),
            Utf8PathBuf::from("/a/b/d.sol")
        );
    }

    #[test]
    fn normalize_path_drops_duplicate_separators() {
        assert_eq!(
            normalize_path(Utf8Path::new("/a//b///c.sol")),
            Utf8PathBuf::from("/a/b/c.sol")
        );
    }

    #[test]
    fn combine_paths_resolves_relative_reference() {
        assert_eq!(
            combine_paths(Utf8Path::new("/ws/contracts"), "../lib/safe.sol"),
            Utf8PathBuf::from("/ws/lib/safe.sol")
        );
    }

    #[test]
    fn combine_paths_keeps_rooted_reference() {
        assert_eq!(
            combine_paths(Utf8Path::new("/ws/contracts"), "/abs/other.sol"),
            Utf8PathBuf::from("/abs/other.sol")
        );
    }
}
