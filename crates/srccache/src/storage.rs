//! On-disk cache storage.
//!
//! Cache files are replaced wholesale: content is streamed into a temp file
//! in the target directory and renamed over the cache path, so readers never
//! observe a partial write.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::CacheError;
use crate::meta::CacheMeta;
use crate::path::{lock_path, meta_path};

/// A cached entry with its metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Path to the cached file
    pub path: PathBuf,
    /// Cache metadata
    pub meta: CacheMeta,
}

/// Statistics from a GC operation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of files removed
    pub files_removed: usize,
    /// Total bytes freed
    pub bytes_freed: u64,
    /// Number of files kept
    pub files_kept: usize,
}

/// File-system based cache storage rooted at a cache directory.
pub struct FsStorage {
    cache_dir: PathBuf,
}

impl FsStorage {
    /// Create a new FsStorage with the given cache directory.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Get the cache directory path.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// List all cached entries that have metadata.
    pub fn list(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut entries = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(entries);
        }

        for entry in walkdir::WalkDir::new(&self.cache_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if let Some(cache_entry) = try_read_cache_entry(entry.path()) {
                entries.push(cache_entry);
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Remove a cached file and its metadata.
    pub fn remove(&self, cache_path: &Path) -> Result<(), CacheError> {
        let _lock = FileLock::acquire(cache_path)?;

        let meta_file_path = meta_path(cache_path);
        if cache_path.exists() {
            fs::remove_file(cache_path)?;
        }
        if meta_file_path.exists() {
            fs::remove_file(&meta_file_path)?;
        }

        Ok(())
    }

    /// Remove entries fetched longer than `older_than` ago.
    ///
    /// Entries that are locked by a concurrent writer are kept.
    pub fn gc(&self, older_than: Duration) -> Result<GcStats, CacheError> {
        let mut stats = GcStats::default();
        let now = chrono::Utc::now();
        let max_age = chrono::Duration::from_std(older_than).unwrap_or(chrono::TimeDelta::MAX);

        for entry in self.list()? {
            if entry.meta.age(now) <= max_age {
                stats.files_kept += 1;
                continue;
            }

            let lock_file_path = lock_path(&entry.path);
            let Ok(lock_file) = File::create(&lock_file_path) else {
                stats.files_kept += 1;
                continue;
            };
            if lock_file.try_lock_exclusive().is_err() {
                // Entry is being written, skip it
                stats.files_kept += 1;
                continue;
            }

            if let Ok(()) = fs::remove_file(&entry.path) {
                let _ = fs::remove_file(meta_path(&entry.path));
                stats.files_removed += 1;
                stats.bytes_freed += entry.meta.size_bytes;
                debug!(source = %entry.meta.source, "removed cache entry");
            } else {
                stats.files_kept += 1;
            }

            drop(lock_file);
        }

        Ok(stats)
    }

    /// Remove all cached entries.
    pub fn clean(&self) -> Result<(), CacheError> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }
}

/// Atomically replace the file at `cache_path` with the bytes written by `fill`.
///
/// If `fill` fails, the previous cached copy (if any) is left untouched.
pub fn write_atomic<F>(cache_path: &Path, source: &str, fill: F) -> Result<CacheMeta, CacheError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), CacheError>,
{
    let dir = cache_path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cache path has no parent: {}", cache_path.display()),
        )
    })?;
    fs::create_dir_all(dir)?;

    let _lock = FileLock::acquire(cache_path)?;

    let mut temp_content = tempfile::NamedTempFile::new_in(dir)?;
    let (content_sha256, size_bytes) = {
        let mut writer = HashingWriter::new(temp_content.as_file_mut());
        fill(&mut writer)?;
        writer.flush()?;
        writer.finish()
    };
    temp_content.as_file().sync_all()?;
    temp_content.persist(cache_path)?;

    let meta = CacheMeta::new(source.to_string(), content_sha256, size_bytes);
    let mut temp_meta = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp_meta, &meta)?;
    temp_meta.persist(meta_path(cache_path))?;

    info!(source, size_bytes, "cache updated");
    Ok(meta)
}

/// Read the metadata sidecar of a cache file, if present.
pub fn read_meta(cache_path: &Path) -> Result<Option<CacheMeta>, CacheError> {
    let meta_file_path = meta_path(cache_path);
    if !meta_file_path.exists() {
        return Ok(None);
    }
    let meta_content = fs::read_to_string(&meta_file_path)?;
    Ok(Some(serde_json::from_str(&meta_content)?))
}

/// Try to read a cache entry from a .meta file path.
/// Returns None if the path is not a .meta file or if reading fails.
fn try_read_cache_entry(path: &Path) -> Option<CacheEntry> {
    if path.extension().and_then(|e| e.to_str()) != Some("meta") {
        return None;
    }

    let content_path = path.with_extension("");
    if !content_path.is_file() {
        return None;
    }

    let meta_content = fs::read_to_string(path).ok()?;
    let meta = serde_json::from_str::<CacheMeta>(&meta_content).ok()?;

    Some(CacheEntry {
        path: content_path,
        meta,
    })
}

/// Exclusive lock on `<cache file>.lock`, released on drop.
///
/// The lock file is never unlinked while in use: every writer must lock the
/// same inode, so it stays next to the entry until `remove` or `clean`.
struct FileLock {
    _file: File,
}

impl FileLock {
    fn acquire(cache_path: &Path) -> Result<Self, CacheError> {
        let lock_file_path = lock_path(cache_path);
        if let Some(parent) = lock_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = File::create(&lock_file_path)?;
        if lock_file.try_lock_exclusive().is_err() {
            info!(path = %cache_path.display(), "waiting for lock on cache entry");
            lock_file.lock_exclusive()?;
        }

        Ok(Self { _file: lock_file })
    }
}

/// Writer that hashes and counts everything passing through it.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    fn finish(self) -> (String, u64) {
        (hex::encode(self.hasher.finalize()), self.written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::compute_content_hash;

    #[test]
    fn test_write_atomic_writes_content_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("a/b/entry.json");

        let meta = write_atomic(&cache_path, "/src/entry.json", |w| {
            w.write_all(b"{\"a\": 1}")?;
            Ok(())
        })
        .unwrap();

        assert_eq!(fs::read(&cache_path).unwrap(), b"{\"a\": 1}");
        assert_eq!(meta.size_bytes, 8);
        assert_eq!(meta.content_sha256, compute_content_hash(b"{\"a\": 1}"));
        assert_eq!(read_meta(&cache_path).unwrap(), Some(meta));
    }

    #[test]
    fn test_lock_file_persists_and_is_released() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("entry.json");
        write_atomic(&cache_path, "src", |w| Ok(w.write_all(b"v1")?)).unwrap();

        // Kept in place so later writers lock the same file.
        let lock_file_path = lock_path(&cache_path);
        assert!(lock_file_path.exists());
        let held = File::open(&lock_file_path).unwrap();
        held.try_lock_exclusive().unwrap();
        FileExt::unlock(&held).unwrap();
        drop(held);

        write_atomic(&cache_path, "src", |w| Ok(w.write_all(b"v2")?)).unwrap();
        assert!(lock_file_path.exists());
        assert_eq!(fs::read(&cache_path).unwrap(), b"v2");
    }

    #[test]
    fn test_write_atomic_failure_keeps_previous_copy() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("entry.json");
        write_atomic(&cache_path, "src", |w| Ok(w.write_all(b"old")?)).unwrap();

        let result = write_atomic(&cache_path, "src", |w| {
            w.write_all(b"partial")?;
            Err(CacheError::NotFound(PathBuf::from("/gone")))
        });

        assert!(matches!(result, Err(CacheError::NotFound(_))));
        assert_eq!(fs::read(&cache_path).unwrap(), b"old");
        // Only the entry, its meta and its lock remain, no stray temp files.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_list_remove_and_clean() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path().join("cache"));
        assert!(storage.list().unwrap().is_empty());

        let first = storage.cache_dir().join("x/one.json");
        let second = storage.cache_dir().join("y/two.json");
        write_atomic(&first, "one", |w| Ok(w.write_all(b"1")?)).unwrap();
        write_atomic(&second, "two", |w| Ok(w.write_all(b"22")?)).unwrap();

        let entries = storage.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].meta.source, "one");
        assert_eq!(entries[1].meta.size_bytes, 2);

        storage.remove(&first).unwrap();
        assert!(!first.exists());
        assert!(!meta_path(&first).exists());
        assert_eq!(storage.list().unwrap().len(), 1);

        storage.clean().unwrap();
        assert!(!storage.cache_dir().exists());
    }

    #[test]
    fn test_gc_removes_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path().to_path_buf());

        let old = dir.path().join("old.json");
        let fresh = dir.path().join("fresh.json");
        write_atomic(&old, "old", |w| Ok(w.write_all(b"old!")?)).unwrap();
        write_atomic(&fresh, "fresh", |w| Ok(w.write_all(b"new")?)).unwrap();

        // Backdate the old entry.
        let mut meta = read_meta(&old).unwrap().unwrap();
        meta.fetched_at = chrono::Utc::now() - chrono::TimeDelta::days(40);
        fs::write(meta_path(&old), serde_json::to_vec(&meta).unwrap()).unwrap();

        let stats = storage.gc(Duration::from_secs(30 * 24 * 60 * 60)).unwrap();
        assert_eq!(
            stats,
            GcStats {
                files_removed: 1,
                bytes_freed: 4,
                files_kept: 1,
            }
        );
        assert!(!old.exists());
        assert!(fresh.exists());
    }
}
