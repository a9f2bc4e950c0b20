//! Groups of paths sharing one hash.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// All paths discovered so far for one file or directory hash.
///
/// `size` and `file_count` are fixed when the aggregate is created; every
/// path added later must describe content of the same size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Size in bytes of each path (total subtree size for directories).
    pub size: u64,
    /// Number of files behind each path (1 for a file).
    pub file_count: u64,
    /// Whether the paths are directories.
    pub is_directory: bool,
    /// Every location with this hash, kept sorted.
    pub paths: BTreeSet<PathBuf>,
}

impl Aggregate {
    /// Create an aggregate for a single file.
    pub fn file(size: u64, path: impl Into<PathBuf>) -> Self {
        Self::new(size, 1, false, path)
    }

    /// Create an aggregate for a single directory.
    pub fn directory(size: u64, file_count: u64, path: impl Into<PathBuf>) -> Self {
        Self::new(size, file_count, true, path)
    }

    fn new(size: u64, file_count: u64, is_directory: bool, path: impl Into<PathBuf>) -> Self {
        let mut paths = BTreeSet::new();
        paths.insert(path.into());
        Self {
            size,
            file_count,
            is_directory,
            paths,
        }
    }

    /// Record another location with the same hash.
    pub fn add_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(path.into());
    }

    /// Number of recorded paths.
    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// Check if more than one location shares this hash.
    pub fn is_duplicated(&self) -> bool {
        self.paths.len() >= 2
    }

    /// Combined size of all copies.
    pub fn total_size(&self) -> u64 {
        self.size.saturating_mul(self.paths.len() as u64)
    }

    /// Check if some recorded path equals `candidate` or contains it.
    pub fn covers(&self, candidate: &Path) -> bool {
        self.paths.iter().any(|path| candidate.starts_with(path))
    }

    /// Check if every path of `candidate` lies at or below one of our paths.
    ///
    /// An aggregate for `x/y` and `x/z` implies one for `x/y/1` and `x/z/1`.
    pub fn implies(&self, candidate: &Aggregate) -> bool {
        candidate.paths.iter().all(|path| self.covers(path))
    }

    /// Depth of the shallowest path, used to order equally sized aggregates.
    pub fn min_depth(&self) -> usize {
        self.paths
            .iter()
            .map(|path| path.components().count())
            .min()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate(paths: &[&str]) -> Aggregate {
        let mut iter = paths.iter();
        let mut agg = Aggregate::directory(100, 2, *iter.next().unwrap());
        for path in iter {
            agg.add_path(*path);
        }
        agg
    }

    #[test]
    fn test_add_path_dedupes() {
        let mut agg = Aggregate::file(5, "/a/x");
        agg.add_path("/a/x");
        agg.add_path("/b/x");
        assert_eq!(agg.path_count(), 2);
        assert!(agg.is_duplicated());
        assert_eq!(agg.total_size(), 10);
    }

    #[test]
    fn test_implies_sub_paths() {
        let parent = aggregate(&["x/y", "x/z"]);
        let child = aggregate(&["x/y/1", "x/y/2"]);
        assert!(parent.implies(&child));
        assert!(!child.implies(&parent));
    }

    #[test]
    fn test_implies_respects_component_boundary() {
        let parent = aggregate(&["/a/b", "/c"]);
        let sibling = aggregate(&["/a/bc", "/c/d"]);
        assert!(!parent.implies(&sibling));
    }

    #[test]
    fn test_implies_itself() {
        let agg = aggregate(&["/a/b", "/c/d"]);
        assert!(agg.implies(&agg.clone()));
    }

    #[test]
    fn test_min_depth() {
        let agg = aggregate(&["/a/b/c", "/a"]);
        assert_eq!(agg.min_depth(), 2);
    }
}
