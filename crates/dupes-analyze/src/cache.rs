//! Persistent cache of file hashes keyed by file identity.
//!
//! An entry is reused as long as the observed size and modification time
//! match the cached ones. Content is never re-verified, so a file
//! rewritten with the same size within the same second keeps its old
//! hash.

use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use dupes_core::{ContentHash, FileEntry, FileIdentity, FileStats, HashError};

use crate::error::CacheError;
use crate::hasher::ContentHasher;

const CACHE_VERSION: u32 = 1;

/// Default wall-clock interval between automatic saves.
pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CacheRecord>,
}

#[derive(Serialize, Deserialize)]
struct CacheRecord {
    directory: String,
    name: String,
    hash: String,
    size: u64,
    modified: u64,
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries read from storage on open.
    pub loaded: usize,
    /// Lookups answered without hashing.
    pub hits: u64,
    /// Files hashed successfully.
    pub hashes: u64,
    /// Files that could not be hashed.
    pub failures: u64,
}

/// Result of refreshing one file.
#[derive(Debug)]
pub struct Refreshed {
    /// Current record for the file.
    pub stats: FileStats,
    /// Why the hash is missing, when hashing failed in this session.
    pub failure: Option<HashError>,
}

/// In-memory table of [`FileStats`] backed by a JSON file.
#[derive(Debug)]
pub struct MetadataCache {
    path: Option<PathBuf>,
    entries: HashMap<FileIdentity, FileStats>,
    autosave_interval: Duration,
    last_persisted: Instant,
    dirty: bool,
    stats: CacheStats,
}

impl MetadataCache {
    /// Open the cache stored at `path`.
    ///
    /// A missing, unreadable or corrupt file yields an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load(&path);
        let mut cache = Self::with_entries(Some(path), entries);
        cache.stats.loaded = cache.entries.len();
        cache
    }

    /// Create a cache that is never written to storage.
    pub fn in_memory() -> Self {
        Self::with_entries(None, HashMap::new())
    }

    fn with_entries(path: Option<PathBuf>, entries: HashMap<FileIdentity, FileStats>) -> Self {
        Self {
            path,
            entries,
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            last_persisted: Instant::now(),
            dirty: false,
            stats: CacheStats::default(),
        }
    }

    /// Set the interval used by [`MetadataCache::persist_if_due`].
    pub fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval = interval;
        self
    }

    /// Change the autosave interval of an open cache.
    pub fn set_autosave_interval(&mut self, interval: Duration) {
        self.autosave_interval = interval;
    }

    /// Storage location, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of entries in memory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Session counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Get the stored record, fresh or not.
    pub fn get(&self, identity: &FileIdentity) -> Option<&FileStats> {
        self.entries.get(identity)
    }

    /// Iterate over every entry.
    pub fn iter(&self) -> impl Iterator<Item = (&FileIdentity, &FileStats)> {
        self.entries.iter()
    }

    /// Return the cached record if it is usable for this observation.
    ///
    /// A record without a hash is never usable, so failed files are
    /// retried on the next lookup.
    pub fn lookup(&self, identity: &FileIdentity, size: u64, modified_at: u64) -> Option<FileStats> {
        self.entries
            .get(identity)
            .filter(|stats| stats.is_hashed() && stats.is_fresh(size, modified_at))
            .copied()
    }

    /// Return the cached record, hashing the file again if it is stale.
    ///
    /// Per-file hashing failures produce a record without a hash; only an
    /// unavailable hashing mechanism is returned as an error.
    pub fn get_or_refresh<H>(
        &mut self,
        identity: &FileIdentity,
        size: u64,
        modified_at: u64,
        hasher: &H,
    ) -> Result<FileStats, HashError>
    where
        H: ContentHasher + ?Sized,
    {
        if let Some(stats) = self.lookup(identity, size, modified_at) {
            self.stats.hits += 1;
            return Ok(stats);
        }

        let result = hasher.hash_file(&identity.path());
        let refreshed = self.store(identity.clone(), size, modified_at, result)?;
        Ok(refreshed.stats)
    }

    /// Refresh a batch of files, hashing the stale ones.
    ///
    /// Results are returned in input order. Each file of the batch must
    /// have a distinct identity; stale files are hashed on the rayon pool
    /// when `parallel` is set.
    pub fn refresh_batch<H>(
        &mut self,
        files: &[FileEntry],
        hasher: &H,
        parallel: bool,
    ) -> Result<Vec<Refreshed>, HashError>
    where
        H: ContentHasher + ?Sized,
    {
        let mut results: Vec<Option<Refreshed>> = (0..files.len()).map(|_| None).collect();
        let mut misses = Vec::new();

        for (i, file) in files.iter().enumerate() {
            let Some(identity) = file.identity() else {
                let error = std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "file name is not valid UTF-8",
                );
                self.stats.failures += 1;
                results[i] = Some(Refreshed {
                    stats: FileStats::new(None, file.size, file.modified_at),
                    failure: Some(HashError::unreadable(&file.path, error)),
                });
                continue;
            };

            match self.lookup(&identity, file.size, file.modified_at) {
                Some(stats) => {
                    self.stats.hits += 1;
                    results[i] = Some(Refreshed {
                        stats,
                        failure: None,
                    });
                }
                None => misses.push((i, identity)),
            }
        }

        let hash_one = |(i, identity): (usize, FileIdentity)| {
            let result = hasher.hash_file(&files[i].path);
            (i, identity, result)
        };
        let hashed: Vec<(usize, FileIdentity, Result<ContentHash, HashError>)> =
            if parallel && misses.len() > 1 {
                misses.into_par_iter().map(hash_one).collect()
            } else {
                misses.into_iter().map(hash_one).collect()
            };

        for (i, identity, result) in hashed {
            let file = &files[i];
            results[i] = Some(self.store(identity, file.size, file.modified_at, result)?);
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn store(
        &mut self,
        identity: FileIdentity,
        size: u64,
        modified_at: u64,
        result: Result<ContentHash, HashError>,
    ) -> Result<Refreshed, HashError> {
        let refreshed = match result {
            Ok(hash) => {
                self.stats.hashes += 1;
                Refreshed {
                    stats: FileStats::new(Some(hash), size, modified_at),
                    failure: None,
                }
            }
            Err(err) if err.is_per_file() => {
                self.stats.failures += 1;
                debug!(path = %identity.path().display(), "hashing failed: {err}");
                Refreshed {
                    stats: FileStats::new(None, size, modified_at),
                    failure: Some(err),
                }
            }
            Err(err) => return Err(err),
        };

        self.entries.insert(identity, refreshed.stats);
        self.dirty = true;
        Ok(refreshed)
    }

    /// Persist if the autosave interval has elapsed since the last save.
    ///
    /// Failures are logged and retried after another interval. Returns
    /// whether the cache was written.
    pub fn persist_if_due(&mut self) -> bool {
        if self.last_persisted.elapsed() < self.autosave_interval {
            return false;
        }
        match self.persist() {
            Ok(()) => true,
            Err(err) => {
                warn!("Autosave failed: {err}");
                self.last_persisted = Instant::now();
                false
            }
        }
    }

    /// Write every hashed entry to storage.
    ///
    /// The table is written to a temporary file next to the target and
    /// renamed over it, so a crash leaves the previous file intact.
    pub fn persist(&mut self) -> Result<(), CacheError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if !self.dirty && path.exists() {
            self.last_persisted = Instant::now();
            return Ok(());
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let file = CacheFile {
            version: CACHE_VERSION,
            entries: self.records(),
        };

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| CacheError::io(&dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, &file)?;
            writer.flush().map_err(|e| CacheError::io(&path, e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| CacheError::io(&path, e))?;
        tmp.persist(&path).map_err(|e| CacheError::Persist {
            path: path.clone(),
            source: e.error,
        })?;

        self.dirty = false;
        self.last_persisted = Instant::now();
        info!(entries = file.entries.len(), path = %path.display(), "cache saved");
        Ok(())
    }

    fn records(&self) -> Vec<CacheRecord> {
        let mut records: Vec<CacheRecord> = self
            .entries
            .iter()
            .filter_map(|(identity, stats)| {
                let hash = stats.content_hash?;
                let Some(directory) = identity.directory.to_str() else {
                    warn!(
                        "Not caching {}: directory is not valid UTF-8",
                        identity.path().display()
                    );
                    return None;
                };
                Some(CacheRecord {
                    directory: directory.to_string(),
                    name: identity.name.to_string(),
                    hash: hash.to_hex(),
                    size: stats.size,
                    modified: stats.modified_at,
                })
            })
            .collect();
        records.sort_by(|a, b| (&a.directory, &a.name).cmp(&(&b.directory, &b.name)));
        records
    }
}

fn load(path: &Path) -> HashMap<FileIdentity, FileStats> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no cache yet");
            return HashMap::new();
        }
        Err(err) => {
            warn!("Cannot read cache {}, starting empty: {err}", path.display());
            return HashMap::new();
        }
    };

    let file: CacheFile = match serde_json::from_slice(&content) {
        Ok(file) => file,
        Err(err) => {
            warn!("Cache {} is corrupt, starting empty: {err}", path.display());
            return HashMap::new();
        }
    };

    if file.version != CACHE_VERSION {
        warn!(
            "Cache {} has unsupported version {}, starting empty",
            path.display(),
            file.version
        );
        return HashMap::new();
    }

    let mut entries = HashMap::with_capacity(file.entries.len());
    for record in file.entries {
        let Some(hash) = ContentHash::from_hex(&record.hash) else {
            debug!(name = %record.name, "skipping cache record with invalid hash");
            continue;
        };
        entries.insert(
            FileIdentity::new(record.directory, record.name),
            FileStats::new(Some(hash), record.size, record.modified),
        );
    }
    debug!(entries = entries.len(), path = %path.display(), "cache loaded");
    entries
}
