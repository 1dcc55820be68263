//! # File Cache
//!
//! Key/value cache with one JSON file per key:
//!
//! ```text
//! <cache_dir>/
//!   scene-42.cache        {"key":"scene-42","value":...,"created_at":...,"expires_at":...}
//!   x-2f746d702f61.cache  key "/tmp/a", hex-encoded
//! ```
//!
//! Keys made of `[A-Za-z0-9_.-]` are used as file names directly; anything
//! else (path separators, a leading `.`, a leading `x-`) is hex-encoded
//! behind an `x-` prefix. Writes go through a temp file and a rename, so
//! readers never see a half-written entry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use vidst_core::error::{Error, Result};
use vidst_core::metrics::Metrics;
use vidst_core::{CacheConfig, CacheEntry, Metadata};

const CACHE_SUFFIX: &str = "cache";
const ENCODED_PREFIX: &str = "x-";
const MAX_FILE_STEM: usize = 200;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entry files on disk, expired ones included until purged
    pub entries: usize,
    pub size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    /// Expired entries removed on read or purge
    pub expired: u64,
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    tmp_seq: AtomicU64,
}

/// File-backed cache
pub struct FileCache {
    config: CacheConfig,
    // Serializes writers so eviction and the entry count agree
    write_lock: Mutex<()>,
    counters: CacheCounters,
    metrics: Metrics,
}

impl FileCache {
    /// Open (creating if needed) the cache directory
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_metrics(config, Metrics::new())
    }

    pub fn with_metrics(config: CacheConfig, metrics: Metrics) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.cache_dir)?;
        info!("File cache opened: dir={:?}", config.cache_dir);
        Ok(Self {
            config,
            write_lock: Mutex::new(()),
            counters: CacheCounters::default(),
            metrics,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.config.cache_dir
    }

    /// Store `value` under `key`.
    ///
    /// `ttl` falls back to the configured default; with neither the entry
    /// never expires.
    pub fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
        metadata: Metadata,
    ) -> Result<()> {
        let path = self.entry_path(key)?;
        let ttl = match ttl.or_else(|| self.config.default_ttl()) {
            Some(ttl) => Some(chrono::Duration::from_std(ttl).map_err(|_| {
                Error::validation(format!("cache ttl {:?} is out of range", ttl))
            })?),
            None => None,
        };
        let entry = CacheEntry::new(key, value, ttl).with_metadata(metadata);
        let bytes = serde_json::to_vec(&entry)?;

        let _guard = self.write_lock.lock();
        if let Some(max) = self.config.max_entries {
            if !path.exists() {
                self.evict_to(max.saturating_sub(1))?;
            }
        }

        let tmp = self.config.cache_dir.join(format!(
            ".{}.{}.tmp",
            file_stem(&path),
            self.counters.tmp_seq.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, &bytes)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        self.metrics.record_cache_write();
        debug!("Cache set: key={}, bytes={}", key, bytes.len());
        Ok(())
    }

    /// Fetch a live entry. Expired entries are deleted and count as misses.
    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key)?;
        let entry = match read_entry(&path)? {
            Some(entry) => entry,
            None => {
                self.record_miss();
                return Ok(None);
            }
        };

        let entry = if entry.is_expired(Utc::now()) {
            // A writer may have replaced the file since the unlocked read
            let _guard = self.write_lock.lock();
            match read_entry(&path)? {
                Some(current) if !current.is_expired(Utc::now()) => current,
                Some(_) => {
                    self.remove_file(&path)?;
                    self.counters.expired.fetch_add(1, Ordering::Relaxed);
                    self.record_miss();
                    debug!("Cache entry expired: key={}", key);
                    return Ok(None);
                }
                None => {
                    self.record_miss();
                    return Ok(None);
                }
            }
        } else {
            entry
        };

        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_cache_hit();
        Ok(Some(entry))
    }

    /// Delete an entry, returning whether it existed
    pub fn delete(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key)?;
        let _guard = self.write_lock.lock();
        self.remove_file(&path)
    }

    /// Whether a live entry exists. Does not touch hit/miss counters.
    pub fn contains(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key)?;
        Ok(read_entry(&path)?.map_or(false, |e| !e.is_expired(Utc::now())))
    }

    /// Keys of every entry file, expired ones included, sorted
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entry_files()?
            .iter()
            .filter_map(|path| decode_key(&file_stem(path)))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Remove every entry, returning how many were removed
    pub fn clear(&self) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let mut removed = 0;
        for path in self.entry_files()? {
            if self.remove_file(&path)? {
                removed += 1;
            }
        }
        info!("Cache cleared: removed={}", removed);
        Ok(removed)
    }

    /// Remove expired entries, returning how many were removed.
    /// Unreadable files are left alone.
    pub fn purge_expired(&self) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let now = Utc::now();
        let mut purged = 0;

        for path in self.entry_files()? {
            match read_entry(&path) {
                Ok(Some(entry)) if entry.is_expired(now) => {
                    if self.remove_file(&path)? {
                        purged += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable cache file {:?}: {}", path, e),
            }
        }

        self.counters.expired.fetch_add(purged as u64, Ordering::Relaxed);
        if purged > 0 {
            info!("Purged {} expired cache entries", purged);
        }
        Ok(purged)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let files = self.entry_files()?;
        let mut size_bytes = 0;
        for path in &files {
            match fs::metadata(path) {
                Ok(meta) => size_bytes += meta.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(CacheStats {
            entries: files.len(),
            size_bytes,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
        })
    }

    fn record_miss(&self) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_cache_miss();
    }

    /// Drop the oldest entries until at most `keep` remain
    fn evict_to(&self, keep: usize) -> Result<()> {
        let files = self.entry_files()?;
        if files.len() <= keep {
            return Ok(());
        }

        let mut dated = Vec::with_capacity(files.len());
        for path in files {
            match read_entry(&path) {
                Ok(Some(entry)) => dated.push((Some(entry.created_at), path)),
                Ok(None) => {}
                // Unreadable entries go first
                Err(_) => dated.push((None, path)),
            }
        }
        dated.sort_by(|a, b| a.0.cmp(&b.0));

        let excess = dated.len().saturating_sub(keep);
        let mut evicted = 0u64;
        for (_, path) in dated.into_iter().take(excess) {
            if self.remove_file(&path)? {
                evicted += 1;
            }
        }
        self.metrics.record_cache_eviction(evicted);
        debug!("Cache evicted {} entries", evicted);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dirent in fs::read_dir(&self.config.cache_dir)? {
            let path = dirent?.path();
            let is_entry = path.extension().map_or(false, |ext| ext == CACHE_SUFFIX)
                && !file_stem(&path).starts_with('.');
            if is_entry && path.is_file() {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let stem = encode_key(key)?;
        Ok(self
            .config
            .cache_dir
            .join(format!("{}.{}", stem, CACHE_SUFFIX)))
    }
}

fn read_entry(path: &Path) -> Result<Option<CacheEntry>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| Error::Serialization {
            message: format!("corrupt cache file {:?}: {}", path, e),
        })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_plain_key(key: &str) -> bool {
    !key.starts_with('.')
        && !key.starts_with(ENCODED_PREFIX)
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

fn encode_key(key: &str) -> Result<String> {
    if key.is_empty() {
        return Err(Error::validation("cache key must not be empty"));
    }
    let stem = if is_plain_key(key) {
        key.to_string()
    } else {
        format!("{}{}", ENCODED_PREFIX, hex::encode(key))
    };
    if stem.len() > MAX_FILE_STEM {
        return Err(Error::validation(format!(
            "cache key is too long ({} bytes)",
            key.len()
        )));
    }
    Ok(stem)
}

fn decode_key(stem: &str) -> Option<String> {
    match stem.strip_prefix(ENCODED_PREFIX) {
        Some(encoded) => hex::decode(encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok()),
        None => Some(stem.to_string()),
    }
}
