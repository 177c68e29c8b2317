//! `file` category handlers (spec §4.8), grounded on the teacher's
//! `files/reader.rs` (path-canonicalization security check, size limit)
//! and `files/search.rs` (fuzzy match / glob search over `ignore::WalkBuilder`).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use serde::Serialize;

use crate::error::{ErrorCode, HandlerError};

/// Default cap applied when a caller doesn't have a configured workspace limit handy.
pub const DEFAULT_MAX_READ_BYTES: u64 = 5 * 1024 * 1024;

/// Resolve `requested` against `workspace_root`, rejecting anything that
/// canonicalizes outside the workspace (symlink escapes included).
fn resolve_within(workspace_root: &Path, requested: &str) -> Result<PathBuf, HandlerError> {
    let canonical_root = workspace_root
        .canonicalize()
        .map_err(|e| HandlerError::new(ErrorCode::InvalidRequest, format!("invalid workspace root: {e}")))?;

    let requested_path = Path::new(requested);
    let target = if requested_path.is_absolute() {
        requested_path.to_path_buf()
    } else {
        workspace_root.join(requested_path)
    };

    let canonical_target = target
        .canonicalize()
        .map_err(|e| HandlerError::not_found(format!("path not found: {e}")))?;

    if !canonical_target.starts_with(&canonical_root) {
        return Err(HandlerError::new(
            ErrorCode::Forbidden,
            "path escapes workspace root".to_string(),
        ));
    }

    Ok(canonical_target)
}

#[derive(Serialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "isDirectory")]
    pub is_directory: bool,
    pub size: Option<u64>,
    #[serde(rename = "modifiedAt")]
    pub modified_at: Option<String>,
}

#[derive(Serialize)]
pub struct DirectoryListing {
    pub path: String,
    pub entries: Vec<FileEntry>,
}

pub fn list(workspace_root: &Path, path: &str) -> Result<DirectoryListing, HandlerError> {
    let target = resolve_within(workspace_root, path)?;
    let read_dir = std::fs::read_dir(&target)
        .map_err(|e| HandlerError::handler(format!("cannot read directory: {e}")))?;

    let mut entries = Vec::new();
    for entry in read_dir.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let metadata = entry.metadata().ok();
        let is_directory = metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false);
        let size = metadata.as_ref().and_then(|m| m.is_file().then(|| m.len()));
        let modified_at = metadata.and_then(|m| {
            m.modified().ok().map(|t| {
                let dt: DateTime<Utc> = t.into();
                dt.to_rfc3339()
            })
        });

        entries.push(FileEntry {
            name,
            path: entry.path().to_string_lossy().to_string(),
            is_directory,
            size,
            modified_at,
        });
    }

    entries.sort_by(|a, b| match (a.is_directory, b.is_directory) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });

    Ok(DirectoryListing {
        path: target.to_string_lossy().to_string(),
        entries,
    })
}

#[derive(Serialize)]
pub struct FileContent {
    pub content: String,
}

pub fn read(workspace_root: &Path, path: &str, max_bytes: u64) -> Result<FileContent, HandlerError> {
    let target = resolve_within(workspace_root, path)?;
    if target.is_dir() {
        return Err(HandlerError::invalid_request("path is a directory, not a file"));
    }
    let metadata = std::fs::metadata(&target)
        .map_err(|e| HandlerError::handler(format!("cannot stat file: {e}")))?;
    if metadata.len() > max_bytes {
        return Err(HandlerError::handler(format!(
            "file too large ({} bytes, max {max_bytes})",
            metadata.len()
        )));
    }
    let content = std::fs::read_to_string(&target).map_err(|e| {
        if e.kind() == std::io::ErrorKind::InvalidData {
            HandlerError::invalid_request("file is not valid utf-8 text")
        } else {
            HandlerError::handler(format!("cannot read file: {e}"))
        }
    })?;
    Ok(FileContent { content })
}

pub fn write(
    workspace_root: &Path,
    path: &str,
    content: &str,
    create_backup: bool,
) -> Result<(), HandlerError> {
    let target = resolve_within_for_write(workspace_root, path)?;

    if create_backup && target.exists() {
        let backup = target.with_extension(format!(
            "{}.bak",
            target.extension().and_then(|e| e.to_str()).unwrap_or("")
        ));
        std::fs::copy(&target, &backup)
            .map_err(|e| HandlerError::handler(format!("cannot create backup: {e}")))?;
    }

    std::fs::write(&target, content).map_err(|e| HandlerError::handler(format!("cannot write file: {e}")))
}

/// Like [`resolve_within`] but tolerates a missing target (for new files),
/// still rejecting any existing-parent escape.
fn resolve_within_for_write(workspace_root: &Path, requested: &str) -> Result<PathBuf, HandlerError> {
    let canonical_root = workspace_root
        .canonicalize()
        .map_err(|e| HandlerError::new(ErrorCode::InvalidRequest, format!("invalid workspace root: {e}")))?;

    let requested_path = Path::new(requested);
    let target = if requested_path.is_absolute() {
        requested_path.to_path_buf()
    } else {
        workspace_root.join(requested_path)
    };

    let parent = target
        .parent()
        .ok_or_else(|| HandlerError::invalid_request("path has no parent directory"))?;
    let canonical_parent = parent
        .canonicalize()
        .map_err(|e| HandlerError::not_found(format!("parent directory not found: {e}")))?;

    if !canonical_parent.starts_with(&canonical_root) {
        return Err(HandlerError::new(
            ErrorCode::Forbidden,
            "path escapes workspace root".to_string(),
        ));
    }

    Ok(canonical_parent.join(target.file_name().unwrap_or_default()))
}

#[derive(Serialize)]
pub struct FileStat {
    pub path: String,
    pub size: u64,
    #[serde(rename = "isDirectory")]
    pub is_directory: bool,
    #[serde(rename = "modifiedAt")]
    pub modified_at: Option<String>,
}

pub fn stat(workspace_root: &Path, path: &str) -> Result<FileStat, HandlerError> {
    let target = resolve_within(workspace_root, path)?;
    let metadata = std::fs::metadata(&target)
        .map_err(|e| HandlerError::handler(format!("cannot stat path: {e}")))?;
    Ok(FileStat {
        path: target.to_string_lossy().to_string(),
        size: metadata.len(),
        is_directory: metadata.is_dir(),
        modified_at: metadata.modified().ok().map(|t| {
            let dt: DateTime<Utc> = t.into();
            dt.to_rfc3339()
        }),
    })
}

/// Fuzzy-match a pattern against a string, returning match indices and a
/// score (lower is better) if every character of `pattern` appears in order.
pub fn fuzzy_match(pattern: &str, text: &str) -> Option<(Vec<usize>, i32)> {
    if pattern.is_empty() {
        return Some((vec![], 0));
    }

    let pattern_lower: Vec<char> = pattern.to_lowercase().chars().collect();
    let text_lower: Vec<char> = text.to_lowercase().chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    let mut indices = Vec::with_capacity(pattern_lower.len());
    let mut pattern_idx = 0;
    for (i, &c) in text_lower.iter().enumerate() {
        if pattern_idx < pattern_lower.len() && c == pattern_lower[pattern_idx] {
            indices.push(i);
            pattern_idx += 1;
        }
    }
    if pattern_idx != pattern_lower.len() {
        return None;
    }

    let mut score: i32 = 0;
    if !indices.is_empty() && indices[0] == 0 {
        score -= 15;
    }
    for i in 1..indices.len() {
        if indices[i] == indices[i - 1] + 1 {
            score -= 5;
        } else {
            score += (indices[i] - indices[i - 1]) as i32;
        }
    }
    score += (text.len() as i32) / 3;
    for (idx, &pattern_char) in pattern.chars().collect::<Vec<_>>().iter().enumerate() {
        if idx < indices.len() && text_chars[indices[idx]] == pattern_char {
            score -= 2;
        }
    }

    Some((indices, score))
}

pub fn is_glob_pattern(query: &str) -> bool {
    query.contains('*') || query.contains('?') || query.contains('[')
}

#[derive(Serialize)]
pub struct SearchResult {
    pub name: String,
    pub path: String,
    #[serde(rename = "isDirectory")]
    pub is_directory: bool,
    pub score: i32,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub truncated: bool,
}

pub fn search(workspace_root: &Path, pattern: &str, max_results: usize) -> Result<SearchResponse, HandlerError> {
    let canonical_root = workspace_root
        .canonicalize()
        .map_err(|e| HandlerError::new(ErrorCode::InvalidRequest, format!("invalid workspace root: {e}")))?;

    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Ok(SearchResponse {
            query: pattern.to_string(),
            results: vec![],
            truncated: false,
        });
    }

    let is_glob = is_glob_pattern(pattern);
    let max_results = max_results.min(500);

    let glob_matcher = if is_glob {
        let mut builder = OverrideBuilder::new(&canonical_root);
        let glob = if pattern.starts_with('*') || pattern.starts_with('/') || pattern.contains('/') {
            pattern.to_string()
        } else {
            format!("**/{pattern}")
        };
        builder
            .add(&glob)
            .map_err(|e| HandlerError::invalid_request(format!("invalid glob pattern: {e}")))?;
        Some(
            builder
                .build()
                .map_err(|e| HandlerError::invalid_request(format!("invalid glob pattern: {e}")))?,
        )
    } else {
        None
    };

    let walker = WalkBuilder::new(&canonical_root)
        .hidden(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .follow_links(true)
        .max_depth(Some(25))
        .build();

    let mut results = Vec::new();
    for entry in walker.flatten() {
        if entry.path() == canonical_root {
            continue;
        }
        let path = entry.path();
        let Some(file_name) = path.file_name() else { continue };
        let relative = path.strip_prefix(&canonical_root).unwrap_or(path).to_string_lossy().to_string();
        let is_directory = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);

        let matched = if let Some(ref matcher) = glob_matcher {
            matcher.matched(path, is_directory).is_whitelist()
        } else {
            fuzzy_match(pattern, &relative).is_some()
        };
        if !matched {
            continue;
        }

        let score = if is_glob {
            (relative.matches('/').count() as i32) * 10
        } else {
            fuzzy_match(pattern, &relative).map(|(_, s)| s).unwrap_or(0)
        };

        results.push(SearchResult {
            name: file_name.to_string_lossy().to_string(),
            path: path.to_string_lossy().to_string(),
            is_directory,
            score,
        });
    }

    results.sort_by_key(|r| r.score);
    let truncated = results.len() > max_results;
    results.truncate(max_results);

    Ok(SearchResponse {
        query: pattern.to_string(),
        results,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn rejects_path_outside_root() {
        let root = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let escape = outside.path().to_string_lossy().to_string();
        let err = resolve_within(root.path(), &escape).unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[test]
    fn reads_file_within_root() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("a.txt"), "hello").unwrap();
        let content = read(root.path(), "a.txt", DEFAULT_MAX_READ_BYTES).unwrap();
        assert_eq!(content.content, "hello");
    }

    #[test]
    fn write_then_read_roundtrip() {
        let root = tempdir().unwrap();
        write(root.path(), "b.txt", "world", false).unwrap();
        let content = read(root.path(), "b.txt", DEFAULT_MAX_READ_BYTES).unwrap();
        assert_eq!(content.content, "world");
    }

    #[test]
    fn read_rejects_oversized_file() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("big.bin"), vec![0u8; 64]).unwrap();
        let err = read(root.path(), "big.bin", 16).unwrap_err();
        assert_eq!(err.code, ErrorCode::HandlerError);
    }

    #[test]
    fn glob_detection() {
        assert!(is_glob_pattern("*.rs"));
        assert!(!is_glob_pattern("main.rs"));
    }

    #[test]
    fn fuzzy_subsequence_matches() {
        let (indices, _) = fuzzy_match("mr", "main.rs").unwrap();
        assert_eq!(indices[0], 0);
    }
}
