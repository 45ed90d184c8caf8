//! Filename and directory helpers for cache keys

use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Replace every character that is not alphanumeric with `_`
///
/// Useful for turning names or URLs into flat cache keys.
pub fn sanitize_filename(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Most recent modification time of any file below `dir`
///
/// Returns None if the tree holds no files or cannot be read.
pub fn latest_modification(dir: &Path) -> Option<SystemTime> {
    let mut latest: Option<SystemTime> = None;
    let read_dir = fs::read_dir(dir).ok()?;

    for entry in read_dir.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let modified = if file_type.is_dir() {
            latest_modification(&entry.path())
        } else {
            entry.metadata().and_then(|m| m.modified()).ok()
        };
        latest = latest.max(modified);
    }

    latest
}
