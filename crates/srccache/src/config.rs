//! Cache configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the default cache directory.
pub const CACHE_DIR_ENV: &str = "SRCCACHE_CACHE_DIR";

/// Options shared by every fetcher a factory creates.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Custom cache directory (overrides default)
    pub cache_dir: Option<PathBuf>,
    /// Directory relative local paths are resolved against (default: current dir)
    pub base_dir: Option<PathBuf>,
    /// Force refresh - re-sync even if a cached copy exists
    pub refresh: bool,
    /// Cache only - never contact the source
    pub cache_only: bool,
    /// Request timeout for HTTPS and SSH sessions (default: 30s)
    pub timeout: Duration,
    /// HTTPS connect timeout (default: 10s)
    pub connect_timeout: Duration,
    /// Maximum HTTPS response size (default: 8 MiB)
    pub max_file_size: u64,
    /// Additional known-hosts file for SFTP (default: `$SSH_KEY`)
    pub host_key_file: Option<PathBuf>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_dir: None,
            base_dir: None,
            refresh: false,
            cache_only: false,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_file_size: 8 * 1024 * 1024, // 8 MiB
            host_key_file: None,
        }
    }
}

impl CacheOptions {
    /// The configured cache directory, or [`default_cache_dir`].
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }
}

/// Get the default cache directory.
///
/// - macOS: `~/Library/Caches/dev.srccache.srccache/sources/`
/// - Linux: `~/.cache/srccache/sources/`
/// - Windows: `C:\Users\<User>\AppData\Local\srccache\srccache\cache\sources\`
pub fn default_cache_dir() -> PathBuf {
    std::env::var(CACHE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            directories::ProjectDirs::from("dev", "srccache", "srccache")
                .map(|p| p.cache_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".cache/srccache"))
                .join("sources")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = CacheOptions::default();
        assert!(!opts.refresh);
        assert!(!opts.cache_only);
        assert_eq!(opts.timeout, Duration::from_secs(30));
        assert_eq!(opts.connect_timeout, Duration::from_secs(10));
        assert_eq!(opts.max_file_size, 8 * 1024 * 1024);
    }

    #[test]
    fn test_explicit_cache_dir_wins() {
        let opts = CacheOptions {
            cache_dir: Some(PathBuf::from("/tmp/srccache-test")),
            ..Default::default()
        };
        assert_eq!(
            opts.resolved_cache_dir(),
            PathBuf::from("/tmp/srccache-test")
        );
    }
}
