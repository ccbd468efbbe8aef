//! Fetch caches.
//!
//! Entries are keyed by the location string. The file-backed cache names
//! each entry by the SHA3-256 of its location so arbitrary URIs map to safe
//! file names.

use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use sha3::{Digest as _, Sha3_256};

use super::Cache;
use crate::error::{Error, Result};

/// In-process cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached locations
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, location: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(location).cloned())
    }

    fn set(&self, location: &str, contents: &[u8]) -> Result<()> {
        self.entries
            .write()
            .insert(location.to_string(), contents.to_vec());
        Ok(())
    }
}

/// Cache that never stores anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl Cache for NoopCache {
    fn get(&self, _location: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn set(&self, _location: &str, _contents: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Directory-backed cache with an optional time-to-live
///
/// Expired entries read as misses. [`FileCache::purge_expired`] removes
/// them from disk and is meant to be called from the embedding
/// application's own maintenance schedule.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    ttl: Option<Duration>,
}

impl FileCache {
    /// Open (creating if needed) a cache directory
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::StorageWriteError(format!("create cache dir {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir, ttl: None })
    }

    /// Expire entries older than `ttl`
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// The cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, location: &str) -> PathBuf {
        self.dir
            .join(hex::encode(Sha3_256::digest(location.as_bytes())))
    }

    fn is_expired(&self, modified: SystemTime) -> bool {
        match self.ttl {
            // a clock that went backwards counts as fresh
            Some(ttl) => modified.elapsed().map(|age| age > ttl).unwrap_or(false),
            None => false,
        }
    }

    /// Delete expired entries, returning how many were removed
    pub fn purge_expired(&self) -> Result<usize> {
        if self.ttl.is_none() {
            return Ok(0);
        }

        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| Error::StorageReadError(format!("list {}: {}", self.dir.display(), e)))?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| Error::StorageReadError(e.to_string()))?;
            let metadata = entry
                .metadata()
                .map_err(|e| Error::StorageReadError(e.to_string()))?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map_err(|e| Error::StorageReadError(e.to_string()))?;
            if self.is_expired(modified) {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == IoErrorKind::NotFound => {}
                    Err(e) => return Err(Error::StorageWriteError(e.to_string())),
                }
            }
        }

        tracing::debug!("Purged {} expired cache entries from {}", removed, self.dir.display());
        Ok(removed)
    }
}

impl Cache for FileCache {
    fn get(&self, location: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(location);

        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::StorageReadError(format!("{}: {}", path.display(), e))),
        };
        if let Ok(modified) = metadata.modified() {
            if self.is_expired(modified) {
                return Ok(None);
            }
        }

        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::StorageReadError(format!("{}: {}", path.display(), e))),
        }
    }

    fn set(&self, location: &str, contents: &[u8]) -> Result<()> {
        let path = self.entry_path(location);
        // write-then-rename so readers never see a partial entry
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));

        std::fs::write(&tmp, contents)
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            Error::StorageWriteError(format!("{}: {}", path.display(), e))
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cache() {
        let cache = MemoryCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.get("file://a").unwrap(), None);

        cache.set("file://a", b"contents").unwrap();
        assert_eq!(cache.get("file://a").unwrap().as_deref(), Some(&b"contents"[..]));
        assert_eq!(cache.len(), 1);

        // idempotent overwrite
        cache.set("file://a", b"contents").unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_noop_cache() {
        let cache = NoopCache;
        cache.set("test://x", b"x").unwrap();
        assert_eq!(cache.get("test://x").unwrap(), None);
    }

    #[test]
    fn test_file_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("cache")).unwrap();

        assert_eq!(cache.get("https://host/a?b=c").unwrap(), None);
        cache.set("https://host/a?b=c", b"bytes").unwrap();
        assert_eq!(
            cache.get("https://host/a?b=c").unwrap().as_deref(),
            Some(&b"bytes"[..])
        );
        assert_eq!(cache.get("https://host/other").unwrap(), None);

        // no temp files left behind
        let files = std::fs::read_dir(cache.dir()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_file_cache_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap().with_ttl(Duration::from_millis(50));

        cache.set("test://a", b"a").unwrap();
        assert!(cache.get("test://a").unwrap().is_some());
        assert_eq!(cache.purge_expired().unwrap(), 0);

        std::thread::sleep(Duration::from_millis(120));

        assert_eq!(cache.get("test://a").unwrap(), None);
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(std::fs::read_dir(cache.dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_file_cache_without_ttl_never_purges() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();

        cache.set("test://a", b"a").unwrap();
        assert_eq!(cache.purge_expired().unwrap(), 0);
        assert!(cache.get("test://a").unwrap().is_some());
    }
}
