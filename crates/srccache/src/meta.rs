//! Cache metadata types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata stored next to a cached file as `<file>.meta`.
///
/// The cached file itself holds the raw source bytes only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Source location, without credentials
    pub source: String,
    /// When the file was fetched
    pub fetched_at: DateTime<Utc>,
    /// SHA256 hash of content
    pub content_sha256: String,
    /// File size in bytes
    pub size_bytes: u64,
}

impl CacheMeta {
    /// Create a new CacheMeta stamped with the current time.
    pub fn new(source: String, content_sha256: String, size_bytes: u64) -> Self {
        Self {
            source,
            fetched_at: Utc::now(),
            content_sha256,
            size_bytes,
        }
    }

    /// Age of the entry relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::TimeDelta {
        now.signed_duration_since(self.fetched_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_meta_serde_roundtrip() {
        let meta = CacheMeta::new(
            "https://example.com/catalog.json".to_string(),
            "deadbeef".to_string(),
            512,
        );

        let json = serde_json::to_string(&meta).unwrap();
        let parsed: CacheMeta = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_age() {
        let mut meta = CacheMeta::new("/tmp/a.json".to_string(), "hash".to_string(), 1);
        meta.fetched_at = Utc::now() - chrono::TimeDelta::hours(2);
        assert!(meta.age(Utc::now()) >= chrono::TimeDelta::hours(2));
    }
}
