//! Path resolution - maps remote hierarchical names onto safe local paths
//!
//! Every segment is sanitized on its own, so sanitization never adds or
//! removes a path separator. The mapping is pure and deterministic: the
//! freshness check relies on the same remote record landing on the same
//! local path across runs.

use std::path::{Path, PathBuf};

/// Separator used by remote folder paths (`course files/Unit 1/Readings`)
pub const REMOTE_SEPARATOR: char = '/';

/// Placeholder for segments that sanitize down to nothing or to a dot name
const PLACEHOLDER: &str = "_";

fn is_disallowed(c: char) -> bool {
    matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control()
}

/// Sanitize one path segment
///
/// Disallowed filesystem characters are stripped and every whitespace
/// character becomes `_`. Segments left empty, or consisting only of dots,
/// become `_` so they can never address the current or parent directory.
pub fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .filter(|c| !is_disallowed(*c) || c.is_whitespace())
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        PLACEHOLDER.to_string()
    } else {
        cleaned
    }
}

/// Resolve `root` + remote hierarchy + filename into a local path
///
/// `hierarchy` is split on [`REMOTE_SEPARATOR`]; empty pieces (leading,
/// trailing or doubled separators) carry no name and are dropped.
pub fn resolve(root: &Path, hierarchy: &str, filename: &str) -> PathBuf {
    let mut path = root.to_path_buf();

    for segment in hierarchy.split(REMOTE_SEPARATOR).filter(|s| !s.is_empty()) {
        path.push(sanitize_segment(segment));
    }

    path.push(sanitize_segment(filename));
    path
}

/// Local directory name for a course: `<name>_<id>`
pub fn course_dir_name(name: &str, id: u64) -> String {
    sanitize_segment(&format!("{}_{}", name, id))
}
