//! Garbage collection for the cache.

use std::path::Path;
use std::time::Duration;

use crate::error::CacheError;
use crate::storage::{FsStorage, GcStats};

/// Remove entries fetched longer than `older_than` ago from `cache_dir`.
pub fn gc(cache_dir: &Path, older_than: Duration) -> Result<GcStats, CacheError> {
    FsStorage::new(cache_dir.to_path_buf()).gc(older_than)
}

/// Remove all cached entries from `cache_dir`.
pub fn clean(cache_dir: &Path) -> Result<(), CacheError> {
    FsStorage::new(cache_dir.to_path_buf()).clean()
}

/// Parse a duration string like "30d", "7d", "24h", "1w".
///
/// A bare number is taken as days.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (num_str, unit_secs) = if let Some(stripped) = s.strip_suffix('w') {
        (stripped, 7 * 24 * 60 * 60)
    } else if let Some(stripped) = s.strip_suffix('d') {
        (stripped, 24 * 60 * 60)
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 60 * 60)
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 60)
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 1)
    } else {
        (s, 24 * 60 * 60)
    };

    let num: u64 = num_str.trim().parse().ok()?;
    num.checked_mul(unit_secs).map(Duration::from_secs)
}
