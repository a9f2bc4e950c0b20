//! Bottom-up aggregation of file and directory hashes.
//!
//! The engine consumes a post-order walk. Files are hashed through the
//! [`MetadataCache`] and folded into an accumulator for their parent
//! directory; when a directory is closed its hash is derived from the
//! sorted hashes of its children. Both kinds of hashes land in one map
//! of [`Aggregate`]s keyed by [`NodeHash`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dupes_core::{
    Aggregate, DirectoryEntry, FileEntry, NodeHash, ScanWarning, WalkEntry,
};

use crate::cache::{DEFAULT_AUTOSAVE_INTERVAL, MetadataCache};
use crate::error::AnalyzeError;
use crate::hasher::{ContentHasher, hash_directory};

/// Files hashed together before their results are folded in.
const BATCH_SIZE: usize = 256;

/// Configuration for an aggregation run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct AggregationConfig {
    /// Hash cache misses on the rayon pool.
    #[builder(default = "true")]
    pub parallel_hashing: bool,

    /// Interval between automatic cache saves.
    #[builder(default = "DEFAULT_AUTOSAVE_INTERVAL")]
    pub autosave_interval: Duration,

    /// Maximum number of groups to report (0 = unlimited).
    #[builder(default = "0")]
    pub max_groups: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            parallel_hashing: true,
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            max_groups: 0,
        }
    }
}

impl AggregationConfig {
    /// Create a new config builder.
    pub fn builder() -> AggregationConfigBuilder {
        AggregationConfigBuilder::default()
    }
}

/// Counters for one aggregation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Files consumed.
    pub files: u64,
    /// Directories consumed.
    pub directories: u64,
    /// Files without a hash.
    pub unhashable_files: u64,
    /// Directories without a hash.
    pub unhashable_directories: u64,
    /// Files answered from the cache.
    pub cache_hits: u64,
    /// Files hashed in this run.
    pub hashes: u64,
}

/// Everything an aggregation run produced.
#[derive(Debug)]
pub struct AggregationOutcome {
    /// Every aggregate, duplicated or not.
    pub aggregates: HashMap<NodeHash, Aggregate>,
    /// Run counters.
    pub stats: EngineStats,
    /// Per-item diagnostics.
    pub warnings: Vec<ScanWarning>,
}

impl AggregationOutcome {
    /// Iterate over aggregates with at least two paths.
    pub fn duplicated(&self) -> impl Iterator<Item = (&NodeHash, &Aggregate)> {
        self.aggregates.iter().filter(|(_, agg)| agg.is_duplicated())
    }
}

/// Children folded so far for a directory that is still open.
#[derive(Debug)]
struct DirAccumulator {
    children: Vec<NodeHash>,
    size: u64,
    file_count: u64,
    hashable: bool,
}

impl Default for DirAccumulator {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            size: 0,
            file_count: 0,
            hashable: true,
        }
    }
}

/// Hash, size and file count of a closed directory.
#[derive(Debug, Clone, Copy)]
struct DirSummary {
    hash: NodeHash,
    size: u64,
    file_count: u64,
}

/// Aggregates files and directories by hash.
pub struct AggregationEngine<'a, H: ContentHasher> {
    cache: &'a mut MetadataCache,
    hasher: H,
    config: AggregationConfig,
    interrupt: Option<Arc<AtomicBool>>,
    aggregates: HashMap<NodeHash, Aggregate>,
    open: HashMap<PathBuf, DirAccumulator>,
    /// Closed directories waiting for their parent; `None` when unhashable.
    closed: HashMap<PathBuf, Option<DirSummary>>,
    pending: Vec<FileEntry>,
    stats: EngineStats,
    warnings: Vec<ScanWarning>,
}

impl<'a, H: ContentHasher> AggregationEngine<'a, H> {
    /// Create an engine backed by `cache`.
    pub fn new(cache: &'a mut MetadataCache, hasher: H, config: AggregationConfig) -> Self {
        cache.set_autosave_interval(config.autosave_interval);
        Self {
            cache,
            hasher,
            config,
            interrupt: None,
            aggregates: HashMap::new(),
            open: HashMap::new(),
            closed: HashMap::new(),
            pending: Vec::new(),
            stats: EngineStats::default(),
            warnings: Vec::new(),
        }
    }

    /// Stop with [`AnalyzeError::Interrupted`] once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Configuration of this run.
    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Consume walk entries, children before their parents.
    pub fn consume<I>(&mut self, entries: I) -> Result<(), AnalyzeError>
    where
        I: IntoIterator<Item = WalkEntry>,
    {
        for entry in entries {
            self.process(entry)?;
        }
        self.flush()
    }

    /// Consume a single walk entry.
    ///
    /// Files may be buffered; a directory entry first folds in every
    /// buffered file.
    pub fn process(&mut self, entry: WalkEntry) -> Result<(), AnalyzeError> {
        self.check_interrupt()?;
        match entry {
            WalkEntry::File(file) => {
                self.pending.push(file);
                if self.pending.len() >= BATCH_SIZE {
                    self.flush()?;
                }
            }
            WalkEntry::Directory(dir) => {
                self.flush()?;
                self.close_directory(dir)?;
            }
        }
        self.cache.persist_if_due();
        Ok(())
    }

    /// Fold remaining files in and return the result.
    pub fn finish(mut self) -> Result<AggregationOutcome, AnalyzeError> {
        self.flush()?;

        let duplicated = self
            .aggregates
            .values()
            .filter(|agg| agg.is_duplicated())
            .count();
        info!(
            files = self.stats.files,
            directories = self.stats.directories,
            hashed = self.stats.hashes,
            cache_hits = self.stats.cache_hits,
            unhashable_files = self.stats.unhashable_files,
            unhashable_directories = self.stats.unhashable_directories,
            aggregates = self.aggregates.len(),
            duplicated,
            "aggregation finished"
        );

        Ok(AggregationOutcome {
            aggregates: self.aggregates,
            stats: self.stats,
            warnings: self.warnings,
        })
    }

    fn check_interrupt(&self) -> Result<(), AnalyzeError> {
        match &self.interrupt {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(AnalyzeError::Interrupted),
            _ => Ok(()),
        }
    }

    fn flush(&mut self) -> Result<(), AnalyzeError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let files = std::mem::take(&mut self.pending);

        let before = self.cache.stats();
        let results = self
            .cache
            .refresh_batch(&files, &self.hasher, self.config.parallel_hashing)?;
        let after = self.cache.stats();
        self.stats.cache_hits += after.hits - before.hits;
        self.stats.hashes += after.hashes - before.hashes;

        for (file, refreshed) in files.into_iter().zip(results) {
            self.stats.files += 1;
            let parent = file.parent().to_path_buf();

            let Some(hash) = refreshed.stats.content_hash else {
                self.stats.unhashable_files += 1;
                if let Some(err) = &refreshed.failure {
                    self.warn(ScanWarning::unhashable(&file.path, err));
                }
                if !file.root {
                    self.open.entry(parent).or_default().hashable = false;
                }
                continue;
            };

            let node = NodeHash::File(hash);
            let size = refreshed.stats.size;
            self.insert(node, size, 1, &file.path)?;

            // A root file's parent is never walked, so it is never closed.
            if file.root {
                continue;
            }
            let acc = self.open.entry(parent).or_default();
            acc.children.push(node);
            acc.size += size;
            acc.file_count += 1;
        }
        Ok(())
    }

    fn close_directory(&mut self, dir: DirectoryEntry) -> Result<(), AnalyzeError> {
        self.stats.directories += 1;
        let mut acc = self.open.remove(&dir.path).unwrap_or_default();
        if !dir.complete {
            acc.hashable = false;
        }

        for subdir in &dir.subdirs {
            match self.closed.remove(subdir).flatten() {
                Some(summary) if acc.hashable => {
                    acc.children.push(summary.hash);
                    acc.size += summary.size;
                    acc.file_count += summary.file_count;
                }
                Some(_) => {}
                None => acc.hashable = false,
            }
        }

        if !acc.hashable {
            debug!(path = %dir.path.display(), "directory is unhashable");
            self.stats.unhashable_directories += 1;
            self.closed.insert(dir.path, None);
            return Ok(());
        }

        let hash = hash_directory(&acc.children);
        self.insert(hash, acc.size, acc.file_count, &dir.path)?;
        self.closed.insert(
            dir.path,
            Some(DirSummary {
                hash,
                size: acc.size,
                file_count: acc.file_count,
            }),
        );
        Ok(())
    }

    fn insert(
        &mut self,
        hash: NodeHash,
        size: u64,
        file_count: u64,
        path: &Path,
    ) -> Result<(), AnalyzeError> {
        match self.aggregates.entry(hash) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.size != size {
                    return Err(AnalyzeError::SizeMismatch {
                        hash,
                        path: path.to_path_buf(),
                        size,
                        existing_size: existing.size,
                        existing_paths: existing.paths.iter().cloned().collect(),
                    });
                }
                existing.add_path(path);
            }
            Entry::Vacant(entry) => {
                let aggregate = if hash.is_directory() {
                    Aggregate::directory(size, file_count, path)
                } else {
                    Aggregate::file(size, path)
                };
                entry.insert(aggregate);
            }
        }
        Ok(())
    }

    fn warn(&mut self, warning: ScanWarning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }
}
