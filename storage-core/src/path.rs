//! Path handling for blob keys and share paths.
//!
//! Blob containers use flat keys, so only the leading separators are trimmed
//! ([`normalize_blob_name`]). Shares are hierarchical and need the key split
//! into a directory and a leaf ([`parse`]).

use serde::Serialize;

use crate::error::{Result, StorageError};

/// A path split into its directory part and its leaf file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedPath {
    /// Directory part, empty for the root. Never starts or ends with the
    /// separator the path was split on.
    pub directory_name: String,
    /// Leaf name, never contains a separator.
    pub file_name: String,
}

impl ParsedPath {
    pub fn is_root(&self) -> bool {
        self.directory_name.is_empty()
    }

    /// Reassembles the normalized path with `/` as the separator.
    pub fn full_path(&self) -> String {
        join(&self.directory_name, &self.file_name)
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Splits `raw` on its rightmost `/` or `\`.
///
/// One leading and one trailing separator of the same kind are stripped from
/// the directory part. The split is never recursive, so `a/b/c.txt` yields the
/// directory `a/b`. Malformed input never fails; the worst case is an empty
/// directory name.
pub fn parse(raw: &str) -> ParsedPath {
    let Some(idx) = raw.rfind(is_separator) else {
        return ParsedPath {
            directory_name: String::new(),
            file_name: raw.to_string(),
        };
    };

    // both separators are single-byte
    let separator = &raw[idx..idx + 1];
    let file_name = raw[idx + 1..].to_string();

    let directory = &raw[..idx];
    let directory = directory.strip_prefix(separator).unwrap_or(directory);
    let directory = directory.strip_suffix(separator).unwrap_or(directory);

    ParsedPath {
        directory_name: directory.to_string(),
        file_name,
    }
}

/// Strips every leading `/` and `\` from a blob key.
pub fn normalize_blob_name(raw: &str) -> &str {
    raw.trim_start_matches(is_separator)
}

/// Normalizes a blob key and rejects names that are empty or whitespace.
pub fn validate_blob_name(raw: &str) -> Result<String> {
    let name = normalize_blob_name(raw);
    if name.trim().is_empty() {
        return Err(StorageError::InvalidName(raw.to_string()));
    }
    Ok(name.to_string())
}

/// Normalizes a share directory argument: one leading and one trailing
/// separator are dropped, matching what [`parse`] produces.
pub fn normalize_directory(raw: &str) -> &str {
    let raw = raw.trim();
    let raw = raw.strip_prefix(is_separator).unwrap_or(raw);
    raw.strip_suffix(is_separator).unwrap_or(raw)
}

/// Joins a directory and a leaf with `/`, skipping an empty directory.
pub fn join(directory: &str, file_name: &str) -> String {
    let directory = directory.trim_end_matches(is_separator);
    if directory.is_empty() {
        file_name.to_string()
    } else {
        format!("{directory}/{file_name}")
    }
}

/// Returns the leaf of a client-supplied file name.
///
/// Browsers may post a full local path as the file name, so only the part
/// after the last separator is kept.
pub fn leaf_name(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.rfind(is_separator) {
        Some(idx) => &raw[idx + 1..],
        None => raw,
    }
}
