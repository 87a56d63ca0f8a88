//! Import extraction from Solidity source text.
//!
//! The dependency walker only needs the list of import path strings, so
//! this is not a full tokenizer: it walks the source once, skips comments
//! and string literals, and picks the single path literal out of each
//! `import` statement. Malformed input never fails; it just yields fewer
//! imports.

/// Turns source text into the list of referenced import paths.
///
/// Implementations must never fail: unparsable text degrades to an empty
/// sequence.
pub trait ImportExtractor: Send + Sync {
    fn extract_imports(&self, text: &str) -> Vec<String>;
}

/// Scanner for Solidity import statements.
///
/// Handles every import form the grammar allows, all of which carry exactly
/// one string literal:
///
/// ```text
/// import "./lib.sol";
/// import "./lib.sol" as lib;
/// import * as lib from "./lib.sol";
/// import {A as B, C} from "./lib.sol";
/// ```
#[derive(Debug, Default)]
pub struct SolidityImportScanner;

impl ImportExtractor for SolidityImportScanner {
    fn extract_imports(&self, text: &str) -> Vec<String> {
        let mut imports = Vec::new();
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line_comment(bytes, i),
                b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
                b'"' | b'\'' => i = skip_string(bytes, i).0,
                c if is_identifier_start(c) => {
                    let end = scan_identifier(bytes, i);
                    if &bytes[i..end] == b"import" {
                        let (path, next) = scan_import_statement(text, bytes, end);
                        if let Some(path) = path {
                            imports.push(path);
                        }
                        i = next;
                    } else {
                        i = end;
                    }
                }
                _ => i += 1,
            }
        }
        imports
    }
}

fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$'
}

fn is_identifier_part(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$'
}

fn scan_identifier(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && is_identifier_part(bytes[i]) {
        i += 1;
    }
    i
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 2;
    while i < bytes.len() {
        if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
            return i + 2;
        }
        i += 1;
    }
    i
}

/// Skip a string literal, returning the index past its closing quote and
/// the literal's content span.
fn skip_string(bytes: &[u8], start: usize) -> (usize, Option<(usize, usize)>) {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return (i, None), // unterminated
            c if c == quote => return (i + 1, Some((start + 1, i))),
            _ => i += 1,
        }
    }
    (i, None)
}

/// Scan the remainder of an import statement, returning the path literal
/// (if any) and the index to resume scanning from.
fn scan_import_statement(text: &str, bytes: &[u8], start: usize) -> (Option<String>, usize) {
    let mut path = None;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b';' => return (path, i + 1),
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'"' | b'\'' => {
                let (next, span) = skip_string(bytes, i);
                if path.is_none() {
                    path = span.map(|(from, to)| text[from..to].to_string());
                }
                i = next;
            }
            _ => i += 1,
        }
    }
    (path, i)
}
