//! Cache path computation.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::location::Location;

/// Length of the hash prefix used in cache file names.
const HASH_LEN: usize = 16;

/// Information about a cache key derived from a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyInfo {
    /// Canonical, credential-free identity of the source
    pub canonical: String,
    /// SHA256 hash prefix (16 characters)
    pub hash: String,
    /// Sanitized host directory (`local` for local files)
    pub host: String,
    /// Sanitized file name of the source
    pub filename: String,
    /// Relative path within cache directory
    pub cache_path: String,
}

/// Compute cache key information from a location.
///
/// The cache path uses 2-level directory sharding to prevent directory overcrowding:
/// `{scheme}/{host}/{hash[0:2]}/{hash[2:4]}/{hash}-{filename}`
///
/// Example:
/// - Location: `sftp://example.com:2222/srv/catalog.json`
/// - Path: `sftp/example.com_2222/3f/a9/3fa9c1d2e4b5a6f7-catalog.json`
///
/// Scheme, host, port and the full path all feed the hash. Credentials never do.
pub fn compute_cache_key(location: &Location) -> CacheKeyInfo {
    let canonical = canonical_identity(location);

    let hash_bytes = Sha256::digest(identity_bytes(location, &canonical));
    let hash = hex::encode(hash_bytes)[..HASH_LEN].to_string();

    let host = match location {
        Location::Local { .. } => "local".to_string(),
        Location::Sftp(sftp) if sftp.port != crate::location::SFTP_DEFAULT_PORT => {
            sanitize(&format!("{}_{}", sftp.host, sftp.port))
        }
        Location::Sftp(sftp) => sanitize(&sftp.host),
        Location::Https(https) => match https.url.port() {
            Some(port) => sanitize(&format!(
                "{}_{port}",
                https.url.host_str().unwrap_or("unknown")
            )),
            None => sanitize(https.url.host_str().unwrap_or("unknown")),
        },
    };

    let filename = location
        .file_name()
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "index".to_string());

    let cache_path = format!(
        "{}/{}/{}/{}/{}-{}",
        location.scheme(),
        host,
        &hash[0..2],
        &hash[2..4],
        hash,
        filename
    );

    CacheKeyInfo {
        canonical,
        hash,
        host,
        filename,
        cache_path,
    }
}

/// Convert a location to its full cache file path.
pub fn location_to_cache_path(location: &Location, cache_dir: &Path) -> PathBuf {
    let key_info = compute_cache_key(location);
    cache_dir.join(&key_info.cache_path)
}

/// Get the meta file path for a cache file.
pub fn meta_path(cache_path: &Path) -> PathBuf {
    let mut meta = cache_path.as_os_str().to_owned();
    meta.push(".meta");
    PathBuf::from(meta)
}

/// Get the lock file path for a cache file.
pub fn lock_path(cache_path: &Path) -> PathBuf {
    let mut lock = cache_path.as_os_str().to_owned();
    lock.push(".lock");
    PathBuf::from(lock)
}

/// Compute SHA256 hash of content and return as hex string.
pub fn compute_content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn canonical_identity(location: &Location) -> String {
    match location {
        Location::Local { path } => format!("file://{}", path.to_string_lossy()),
        Location::Sftp(sftp) => format!("sftp://{}:{}{}", sftp.host, sftp.port, sftp.remote_path),
        Location::Https(https) => {
            let port = https.url.port_or_known_default().unwrap_or(443);
            let host = https.url.host_str().unwrap_or("");
            match https.url.query() {
                Some(query) => format!("https://{host}:{port}{}?{query}", https.url.path()),
                None => format!("https://{host}:{port}{}", https.url.path()),
            }
        }
    }
}

/// Bytes fed to the hash. Local paths use their raw OS encoding, so paths that
/// differ only in non-UTF-8 bytes keep distinct entries.
fn identity_bytes(location: &Location, canonical: &str) -> Vec<u8> {
    match location {
        Location::Local { path } => {
            let mut bytes = b"file://".to_vec();
            bytes.extend_from_slice(path.as_os_str().as_encoded_bytes());
            bytes
        }
        _ => canonical.as_bytes().to_vec(),
    }
}

/// Keep a path component safe: no separators, no `.`/`..`, bounded length.
fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(96)
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        cleaned.replace('.', "_")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{HttpsLocation, SftpLocation};
    use url::Url;

    fn classify(raw: &str) -> Location {
        Location::classify(raw, Path::new("/work")).unwrap()
    }

    #[test]
    fn test_compute_cache_key() {
        let key = compute_cache_key(&classify("https://example.com/v1/catalog.json"));

        assert_eq!(key.host, "example.com");
        assert_eq!(key.filename, "catalog.json");
        assert_eq!(key.hash.len(), HASH_LEN);
        assert!(key.cache_path.starts_with("https/example.com/"));
        assert!(key.cache_path.ends_with(&format!("{}-catalog.json", key.hash)));
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        for raw in [
            "/home/user/x.json",
            "sftp://user@host:2000/a/b.json",
            "https://example.com/a.yaml?rev=2",
        ] {
            let first = compute_cache_key(&classify(raw));
            let second = compute_cache_key(&classify(raw));
            assert_eq!(first, second);
        }
        // Known value guards against accidental changes to the layout.
        let key = compute_cache_key(&classify("sftp://host/a.json"));
        assert_eq!(key.canonical, "sftp://host:22/a.json");
    }

    #[test]
    fn test_reconstructed_descriptor_maps_to_same_path() {
        let classified = classify("sftp://bob@Example.com:2000/srv/a.json");
        let rebuilt = Location::Sftp(SftpLocation {
            host: "example.com".to_string(),
            port: 2000,
            user: Some("bob".to_string()),
            password: None,
            remote_path: "/srv/a.json".to_string(),
        });
        let dir = Path::new("/cache");
        assert_eq!(
            location_to_cache_path(&classified, dir),
            location_to_cache_path(&rebuilt, dir)
        );

        let https = Location::Https(HttpsLocation {
            url: Url::parse("https://example.com/x.json").unwrap(),
            credentials: None,
        });
        assert_eq!(
            location_to_cache_path(&classify("https://u:p@example.com/x.json"), dir),
            location_to_cache_path(&https, dir)
        );
    }

    #[test]
    fn test_distinct_sources_do_not_collide() {
        let paths: Vec<String> = [
            "sftp://host-a/same/path.json",
            "sftp://host-b/same/path.json",
            "sftp://host-a:2022/same/path.json",
            "https://host-a/same/path.json",
            "https://host-a/same/path.json?v=2",
            "/same/path.json",
            "/other/path.json",
        ]
        .iter()
        .map(|raw| compute_cache_key(&classify(raw)).cache_path)
        .collect();

        for (i, a) in paths.iter().enumerate() {
            for b in &paths[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_local_paths_do_not_collide() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let a = Location::Local {
            path: PathBuf::from(OsStr::from_bytes(b"/data/\xff.json")),
        };
        let b = Location::Local {
            path: PathBuf::from(OsStr::from_bytes(b"/data/\xfe.json")),
        };
        assert_eq!(compute_cache_key(&a).canonical, compute_cache_key(&b).canonical);
        assert_ne!(compute_cache_key(&a).cache_path, compute_cache_key(&b).cache_path);
    }

    #[test]
    fn test_cache_path_stays_under_cache_dir() {
        let dir = PathBuf::from("/home/user/.cache/srccache/sources");
        for raw in [
            "sftp://host/../../etc/passwd",
            "https://example.com/..",
            "https://example.com/",
            "../../outside.json",
        ] {
            let path = location_to_cache_path(&classify(raw), &dir);
            assert!(path.starts_with(&dir));
            assert!(
                !path
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir)),
                "{raw} produced {}",
                path.display()
            );
        }
    }

    #[test]
    fn test_meta_and_lock_path() {
        let cache_path = PathBuf::from("/cache/https/example.com/a1/b2/a1b2-x.json");
        assert_eq!(
            meta_path(&cache_path),
            PathBuf::from("/cache/https/example.com/a1/b2/a1b2-x.json.meta")
        );
        assert_eq!(
            lock_path(&cache_path),
            PathBuf::from("/cache/https/example.com/a1/b2/a1b2-x.json.lock")
        );
    }

    #[test]
    fn test_compute_content_hash() {
        // SHA256 of empty string
        assert_eq!(
            compute_content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        // SHA256 of "hello"
        assert_eq!(
            compute_content_hash(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
