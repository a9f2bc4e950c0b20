//! JWalk-based tree walker that yields directories after their children.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use jwalk::{Parallelism, WalkDir};
use tracing::{debug, warn};

use dupes_core::{
    DirectoryEntry, FileEntry, ScanConfig, ScanWarning, WalkEntry, WalkStats, WarningKind,
    resolve_root,
};

use crate::exclude::{ExcludeError, ExclusionRules};

/// Walks the configured roots and produces a bottom-up [`Walk`].
pub struct TreeWalker {
    config: ScanConfig,
    rules: ExclusionRules,
    interrupt: Option<Arc<AtomicBool>>,
}

impl TreeWalker {
    /// Create a walker, compiling the exclusion rules.
    pub fn new(config: ScanConfig) -> Result<Self, ExcludeError> {
        let rules = ExclusionRules::new(&config.ignore_patterns)?;
        Ok(Self {
            config,
            rules,
            interrupt: None,
        })
    }

    /// Stop enumerating once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Enumerate every root.
    ///
    /// Missing roots, unlistable directories, symlinks and undecodable
    /// names become warnings on the returned walk; nothing here is fatal.
    pub fn walk(&self) -> Walk {
        let mut walk = Walk::default();

        for root in self.resolve_roots(&mut walk.warnings) {
            if walk.interrupted || self.is_interrupted() {
                walk.interrupted = true;
                break;
            }
            self.collect_root(root, &mut walk);
        }
        if walk.interrupted {
            walk.roots.clear();
            walk.listings.clear();
        }

        debug!(
            files = walk.stats.total_files,
            dirs = walk.stats.total_dirs,
            excluded = walk.stats.total_excluded,
            "walk complete"
        );
        walk
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Resolve roots and drop any root already covered by another.
    fn resolve_roots(&self, warnings: &mut Vec<ScanWarning>) -> Vec<PathBuf> {
        let mut resolved = Vec::with_capacity(self.config.roots.len());
        for root in &self.config.roots {
            match resolve_root(root) {
                Ok(path) => resolved.push(path),
                Err(err) => record(warnings, ScanWarning::io(root, &err, WarningKind::MetadataError)),
            }
        }

        let mut kept = Vec::with_capacity(resolved.len());
        for (i, root) in resolved.iter().enumerate() {
            let covered = resolved.iter().enumerate().any(|(j, other)| {
                j != i && root.starts_with(other) && (root != other || j < i)
            });
            if covered {
                record(
                    warnings,
                    ScanWarning::new(
                        root,
                        format!("{} is already covered by another path", root.display()),
                        WarningKind::OverlappingRoot,
                    ),
                );
                continue;
            }
            kept.push(root.clone());
        }
        kept
    }

    fn collect_root(&self, root: PathBuf, walk: &mut Walk) {
        // Every path below a UTF-8 root is UTF-8 once names are checked.
        if root.to_str().is_none() {
            record(&mut walk.warnings, ScanWarning::non_utf8(&root));
            return;
        }

        let metadata = match std::fs::symlink_metadata(&root) {
            Ok(m) => m,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                record(&mut walk.warnings, ScanWarning::missing_root(&root));
                return;
            }
            Err(err) => {
                record(
                    &mut walk.warnings,
                    ScanWarning::io(&root, &err, WarningKind::MetadataError),
                );
                return;
            }
        };

        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            walk.stats.record_symlink();
            record(
                &mut walk.warnings,
                ScanWarning::new(
                    &root,
                    format!("Not following symbolic link {}", root.display()),
                    WarningKind::Symlink,
                ),
            );
        } else if file_type.is_dir() {
            self.collect_directory(&root, walk);
            if !walk.interrupted {
                walk.roots.push(WalkRoot::Directory(root));
            }
        } else if file_type.is_file() {
            if self.rules.is_excluded(&root) {
                walk.stats.record_excluded();
                return;
            }
            walk.stats.record_file(metadata.len());
            walk.roots.push(WalkRoot::File(
                FileEntry::from_metadata(root, &metadata).into_root(),
            ));
        } else {
            debug!(path = %root.display(), "skipping special file");
        }
    }

    /// Collect the listing of every directory below `root`.
    fn collect_directory(&self, root: &Path, walk: &mut Walk) {
        let parallelism = match self.config.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: std::time::Duration::from_millis(100),
            },
            1 => Parallelism::Serial,
            n => Parallelism::RayonNewPool(n),
        };

        let walker = WalkDir::new(root)
            .parallelism(parallelism)
            .sort(true)
            .skip_hidden(false)
            .follow_links(false);

        walk.listings.insert(root.to_path_buf(), Listing::default());
        walk.stats.record_dir();

        // Directories dropped by exclusion, whose descendants must be dropped too.
        let mut skipped: HashSet<PathBuf> = HashSet::new();

        for entry_result in walker {
            if self.is_interrupted() {
                debug!(root = %root.display(), "walk interrupted");
                walk.interrupted = true;
                return;
            }

            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.to_path_buf());
                    let warning = match err.io_error() {
                        Some(io) => ScanWarning::io(&path, io, WarningKind::ReadError),
                        None => ScanWarning::new(&path, err.to_string(), WarningKind::ReadError),
                    };
                    walk.fail(&path, warning);
                    continue;
                }
            };

            let path = entry.path();
            let file_type = entry.file_type();

            if entry.depth() == 0 {
                if let Some(err) = &entry.read_children_error {
                    walk.fail(&path, listing_warning(&path, err));
                }
                continue;
            }

            let parent = entry.parent_path().to_path_buf();
            if skipped.contains(&parent) {
                if file_type.is_dir() {
                    skipped.insert(path);
                }
                continue;
            }

            let Some(name) = entry.file_name().to_str() else {
                // The parent can no longer be compared as a whole.
                walk.fail(&path, ScanWarning::non_utf8(&path));
                if file_type.is_dir() {
                    skipped.insert(path);
                }
                continue;
            };

            if self.config.should_skip_hidden(name) || self.rules.is_excluded(&path) {
                debug!(path = %path.display(), "excluded");
                walk.stats.record_excluded();
                if file_type.is_dir() {
                    skipped.insert(path);
                }
                continue;
            }

            if file_type.is_symlink() {
                debug!(path = %path.display(), "ignoring symbolic link");
                walk.stats.record_symlink();
                continue;
            }

            if file_type.is_dir() {
                walk.stats.record_dir();
                walk.listings.insert(path.clone(), Listing::default());
                if let Some(listing) = walk.listings.get_mut(&parent) {
                    listing.subdirs.push(path.clone());
                }
                if let Some(err) = &entry.read_children_error {
                    walk.fail(&path, listing_warning(&path, err));
                }
            } else if file_type.is_file() {
                match entry.metadata() {
                    Ok(metadata) => {
                        walk.stats.record_file(metadata.len());
                        if let Some(listing) = walk.listings.get_mut(&parent) {
                            listing.files.push(FileEntry::from_metadata(path, &metadata));
                        }
                    }
                    Err(err) => {
                        let warning = match err.io_error() {
                            Some(io) => ScanWarning::io(&path, io, WarningKind::MetadataError),
                            None => {
                                ScanWarning::new(&path, err.to_string(), WarningKind::MetadataError)
                            }
                        };
                        walk.fail(&path, warning);
                    }
                }
            }
        }
    }
}

fn listing_warning(path: &Path, err: &jwalk::Error) -> ScanWarning {
    match err.io_error() {
        Some(io) => ScanWarning::io(path, io, WarningKind::ReadError),
        None => ScanWarning::new(path, err.to_string(), WarningKind::ReadError),
    }
}

fn record(warnings: &mut Vec<ScanWarning>, warning: ScanWarning) {
    warn!("{}", warning.message);
    warnings.push(warning);
}

/// Children of one directory, collected during the walk.
#[derive(Debug)]
struct Listing {
    files: Vec<FileEntry>,
    subdirs: Vec<PathBuf>,
    complete: bool,
}

impl Default for Listing {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            subdirs: Vec::new(),
            complete: true,
        }
    }
}

#[derive(Debug)]
enum WalkRoot {
    File(FileEntry),
    Directory(PathBuf),
}

/// Result of enumerating the roots.
///
/// Iterating a walk yields every file and directory in post-order: a
/// directory comes after its files and after all of its sub-directories.
#[derive(Debug, Default)]
pub struct Walk {
    roots: Vec<WalkRoot>,
    listings: HashMap<PathBuf, Listing>,
    stats: WalkStats,
    warnings: Vec<ScanWarning>,
    interrupted: bool,
}

impl Walk {
    /// Summary statistics.
    pub fn stats(&self) -> &WalkStats {
        &self.stats
    }

    /// Diagnostics recorded while enumerating.
    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    /// Move the diagnostics out, leaving the walk iterable.
    pub fn take_warnings(&mut self) -> Vec<ScanWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Check if enumeration stopped early on the interrupt flag.
    ///
    /// An interrupted walk holds no roots.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Check if nothing was found.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Mark the listing containing `path` incomplete and record a warning.
    ///
    /// A path with its own listing (a directory) is marked itself,
    /// anything else marks its parent. Repeated failures of an already
    /// incomplete directory are reported once.
    fn fail(&mut self, path: &Path, warning: ScanWarning) {
        match self.listings.get_mut(path) {
            Some(listing) if !listing.complete => return,
            Some(listing) => listing.complete = false,
            None => {
                if let Some(listing) = path.parent().and_then(|p| self.listings.get_mut(p)) {
                    listing.complete = false;
                }
            }
        }
        record(&mut self.warnings, warning);
    }
}

impl IntoIterator for Walk {
    type Item = WalkEntry;
    type IntoIter = PostOrder;

    fn into_iter(self) -> PostOrder {
        PostOrder {
            roots: self.roots.into(),
            listings: self.listings,
            stack: Vec::new(),
            ready: VecDeque::new(),
        }
    }
}

enum Frame {
    Enter(PathBuf),
    Exit(PathBuf, Listing),
}

/// Lazy post-order iterator over a [`Walk`], driven by an explicit stack.
pub struct PostOrder {
    roots: VecDeque<WalkRoot>,
    listings: HashMap<PathBuf, Listing>,
    stack: Vec<Frame>,
    ready: VecDeque<WalkEntry>,
}

impl Iterator for PostOrder {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<WalkEntry> {
        loop {
            if let Some(entry) = self.ready.pop_front() {
                return Some(entry);
            }

            match self.stack.pop() {
                Some(Frame::Enter(path)) => {
                    let Some(listing) = self.listings.remove(&path) else {
                        continue;
                    };
                    let subdirs = listing.subdirs.clone();
                    self.stack.push(Frame::Exit(path, listing));
                    for subdir in subdirs.into_iter().rev() {
                        self.stack.push(Frame::Enter(subdir));
                    }
                }
                Some(Frame::Exit(path, listing)) => {
                    self.ready
                        .extend(listing.files.into_iter().map(WalkEntry::File));
                    self.ready.push_back(WalkEntry::Directory(DirectoryEntry {
                        path,
                        subdirs: listing.subdirs,
                        complete: listing.complete,
                    }));
                }
                None => match self.roots.pop_front()? {
                    WalkRoot::File(file) => return Some(WalkEntry::File(file)),
                    WalkRoot::Directory(path) => self.stack.push(Frame::Enter(path)),
                },
            }
        }
    }
}
