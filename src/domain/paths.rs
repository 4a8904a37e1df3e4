//! Helpers for slash-separated store paths such as `/Root/Site/Page`.
//!
//! Paths are absolute, start with a single `/`, and never end with one. The
//! store root is configurable and may span several segments. Comparisons are
//! case-insensitive, so every lookup key goes through [`lookup_key`].

use super::error::DomainError;

pub const SEPARATOR: char = '/';

/// Validate and normalize a path: trims trailing separators and rejects
/// relative or empty paths and empty segments.
pub fn normalize(path: &str) -> Result<String, DomainError> {
    let trimmed = path.trim().trim_end_matches(SEPARATOR);
    if !trimmed.starts_with(SEPARATOR) {
        return Err(DomainError::invalid_path(path, "path must be absolute"));
    }
    if trimmed.len() == 1 {
        return Err(DomainError::invalid_path(path, "path has no segments"));
    }
    if trimmed[1..].split(SEPARATOR).any(str::is_empty) {
        return Err(DomainError::invalid_path(path, "path contains an empty segment"));
    }
    Ok(trimmed.to_string())
}

/// Join a parent path and a single child name.
pub fn join(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches(SEPARATOR);
    let name = name.trim_matches(SEPARATOR);
    format!("{parent}{SEPARATOR}{name}")
}

/// Parent of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    let path = path.trim_end_matches(SEPARATOR);
    match path.rfind(SEPARATOR) {
        Some(0) | None => None,
        Some(index) => Some(&path[..index]),
    }
}

/// Last segment of `path`.
pub fn name(path: &str) -> &str {
    let path = path.trim_end_matches(SEPARATOR);
    path.rsplit(SEPARATOR).next().unwrap_or(path)
}

/// Number of segments in `path`.
pub fn depth(path: &str) -> usize {
    path.trim_end_matches(SEPARATOR)
        .split(SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .count()
}

/// Case-folded key used by every path map.
pub fn lookup_key(path: &str) -> String {
    path.trim_end_matches(SEPARATOR).to_lowercase()
}

/// Whether `path` lies strictly below `ancestor`.
pub fn is_descendant_of(path: &str, ancestor: &str) -> bool {
    let path = lookup_key(path);
    let mut prefix = lookup_key(ancestor);
    prefix.push(SEPARATOR);
    path.starts_with(&prefix)
}

/// The ancestor walk for `path` below `root`: the path itself, then each
/// ancestor, most specific first. `root` is never yielded, and paths outside
/// `root` yield nothing.
pub fn ancestor_walk<'a>(path: &'a str, root: &str) -> Vec<&'a str> {
    let mut walk = Vec::new();
    let mut current = path.trim_end_matches(SEPARATOR);
    while is_descendant_of(current, root) {
        walk.push(current);
        match parent(current) {
            Some(next) => current = next,
            None => break,
        }
    }
    walk
}
