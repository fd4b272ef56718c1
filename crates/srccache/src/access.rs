//! Cache access policy.
//!
//! Decides, from the fetcher flags and whether a cached copy exists, if a
//! sync must run before content is read.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::document::DocumentFormat;
use crate::error::CacheError;

/// Per-fetcher policy flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetcherState {
    /// Re-sync even if a cached copy exists.
    pub refresh: bool,
    /// Never touch the network; only existing cache content may be used.
    pub cache_only: bool,
}

impl FetcherState {
    pub fn new(refresh: bool, cache_only: bool) -> Self {
        Self {
            refresh,
            cache_only,
        }
    }
}

/// What to do before reading the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    /// Fetch from the source and replace the cached copy.
    Sync,
    /// Use the cached copy as is.
    UseCached,
    /// A refresh was requested in cache-only mode; the cached copy is used.
    RefreshSuppressed,
    /// Cache-only mode and nothing cached.
    CacheOnlyMiss,
}

/// Apply the update policy.
///
/// `cache_only` wins over `refresh`: no sync is ever planned in cache-only mode.
pub fn plan_update(state: FetcherState, cached: bool) -> UpdateAction {
    match (state.cache_only, state.refresh, cached) {
        (true, _, false) => UpdateAction::CacheOnlyMiss,
        (true, true, true) => UpdateAction::RefreshSuppressed,
        (true, false, true) => UpdateAction::UseCached,
        (false, true, _) | (false, false, false) => UpdateAction::Sync,
        (false, false, true) => UpdateAction::UseCached,
    }
}

/// Read the raw bytes of a cache file.
///
/// A missing file is reported as [`CacheError::CacheMissing`], not as an empty read.
pub fn read_cached(cache_path: &Path) -> Result<Vec<u8>, CacheError> {
    if !cache_path.is_file() {
        return Err(CacheError::CacheMissing(cache_path.to_path_buf()));
    }
    Ok(fs::read(cache_path)?)
}

/// Parse cached bytes as a structured document, choosing the format from the path.
pub fn parse_cached<T: DeserializeOwned>(cache_path: &Path, bytes: &[u8]) -> Result<T, CacheError> {
    let validation = |source| CacheError::Validation {
        path: cache_path.to_path_buf(),
        source,
    };
    let format = DocumentFormat::from_path(cache_path).map_err(validation)?;
    format.parse(bytes).map_err(validation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_update() {
        let cases = [
            // (refresh, cache_only, cached) -> action
            ((false, false, false), UpdateAction::Sync),
            ((false, false, true), UpdateAction::UseCached),
            ((true, false, false), UpdateAction::Sync),
            ((true, false, true), UpdateAction::Sync),
            ((false, true, false), UpdateAction::CacheOnlyMiss),
            ((false, true, true), UpdateAction::UseCached),
            ((true, true, false), UpdateAction::CacheOnlyMiss),
            ((true, true, true), UpdateAction::RefreshSuppressed),
        ];
        for ((refresh, cache_only, cached), expected) in cases {
            assert_eq!(
                plan_update(FetcherState::new(refresh, cache_only), cached),
                expected,
                "refresh={refresh} cache_only={cache_only} cached={cached}"
            );
        }
    }

    #[test]
    fn test_read_cached_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            read_cached(&missing),
            Err(CacheError::CacheMissing(p)) if p == missing
        ));
    }

    #[test]
    fn test_parse_cached_wraps_parser_error() {
        let path = Path::new("/cache/x.json");
        let result: Result<serde_json::Value, _> = parse_cached(path, b"{not json");
        assert!(matches!(
            result,
            Err(CacheError::Validation { path: p, .. }) if p == path
        ));

        let result: Result<serde_json::Value, _> = parse_cached(Path::new("/cache/x.bin"), b"{}");
        assert!(matches!(result, Err(CacheError::Validation { .. })));
    }
}
