//! Entries produced by the tree walker and summary statistics.

use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::node::FileIdentity;

/// A regular file found during a walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Size in bytes at walk time.
    pub size: u64,
    /// Modification time in seconds since the Unix epoch.
    pub modified_at: u64,
    /// Named directly as a walk root rather than found in a walked directory.
    #[serde(default)]
    pub root: bool,
}

impl FileEntry {
    /// Create a new file entry.
    pub fn new(path: impl Into<PathBuf>, size: u64, modified_at: u64) -> Self {
        Self {
            path: path.into(),
            size,
            modified_at,
            root: false,
        }
    }

    /// Mark this file as a walk root.
    pub fn into_root(mut self) -> Self {
        self.root = true;
        self
    }

    /// Build an entry from file metadata.
    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &std::fs::Metadata) -> Self {
        let modified_at = metadata.modified().map(epoch_seconds).unwrap_or(0);
        Self::new(path, metadata.len(), modified_at)
    }

    /// Cache identity of this file.
    pub fn identity(&self) -> Option<FileIdentity> {
        FileIdentity::from_path(&self.path)
    }

    /// Directory containing this file.
    pub fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// A directory whose entire subtree has already been yielded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Absolute path of the directory.
    pub path: PathBuf,
    /// Immediate sub-directories, each yielded before this entry.
    pub subdirs: Vec<PathBuf>,
    /// False when the listing failed or a child could not be enumerated.
    pub complete: bool,
}

/// One step of a bottom-up walk.
///
/// Every file of a directory and every sub-directory is yielded before
/// the directory itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalkEntry {
    /// A regular file.
    File(FileEntry),
    /// A directory, closed after all of its children.
    Directory(DirectoryEntry),
}

impl WalkEntry {
    /// Path of the entry.
    pub fn path(&self) -> &Path {
        match self {
            WalkEntry::File(file) => &file.path,
            WalkEntry::Directory(dir) => &dir.path,
        }
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, WalkEntry::Directory(_))
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, WalkEntry::File(_))
    }
}

/// Summary statistics for a walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkStats {
    /// Total size of enumerated files in bytes.
    pub total_size: u64,
    /// Number of enumerated files.
    pub total_files: u64,
    /// Number of enumerated directories, roots included.
    pub total_dirs: u64,
    /// Number of symbolic links ignored.
    pub total_symlinks: u64,
    /// Number of paths dropped by exclusion rules.
    pub total_excluded: u64,
}

impl WalkStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file.
    pub fn record_file(&mut self, size: u64) {
        self.total_files += 1;
        self.total_size += size;
    }

    /// Record a directory.
    pub fn record_dir(&mut self) {
        self.total_dirs += 1;
    }

    /// Record a symlink.
    pub fn record_symlink(&mut self) {
        self.total_symlinks += 1;
    }

    /// Record an excluded path.
    pub fn record_excluded(&mut self) {
        self.total_excluded += 1;
    }
}

/// Resolve a root to the path it names.
///
/// The result is absolute, has no `.` or `..` components, and has its
/// parent directories' symlinks resolved. The last component is kept as
/// given, so a symlink named as a root is still seen as one.
pub fn resolve_root(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let resolved = match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent).map(|p| p.join(name)),
        // Ends in `..` or is the filesystem root.
        _ => std::fs::canonicalize(&absolute),
    };
    Ok(resolved.unwrap_or_else(|_| normalize(&absolute)))
}

/// Drop `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Convert a timestamp to whole seconds since the Unix epoch.
///
/// Times before the epoch map to 0.
pub fn epoch_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_walk_stats_record() {
        let mut stats = WalkStats::new();
        stats.record_file(1024);
        stats.record_file(10);
        stats.record_dir();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_size, 1034);
        assert_eq!(stats.total_dirs, 1);
    }

    #[test]
    fn test_epoch_seconds() {
        let time = UNIX_EPOCH + Duration::from_millis(1_500);
        assert_eq!(epoch_seconds(time), 1);
        assert_eq!(epoch_seconds(UNIX_EPOCH - Duration::from_secs(5)), 0);
    }

    #[test]
    fn test_file_entry_identity() {
        let entry = FileEntry::new("/tmp/x/y.txt", 3, 0);
        let identity = entry.identity().unwrap();
        assert_eq!(identity.name.as_str(), "y.txt");
        assert_eq!(entry.parent(), Path::new("/tmp/x"));
        assert!(!entry.root);
        assert!(entry.into_root().root);
    }

    #[test]
    fn test_resolve_root_removes_dot_components() {
        let temp = tempfile::TempDir::new().unwrap();
        let base = std::fs::canonicalize(temp.path()).unwrap();
        std::fs::create_dir(base.join("data")).unwrap();
        std::fs::create_dir(base.join("other")).unwrap();

        let data = base.join("data");
        assert_eq!(resolve_root(&data).unwrap(), data);
        assert_eq!(resolve_root(&base.join("other/../data")).unwrap(), data);
        assert_eq!(resolve_root(&base.join("./data/.")).unwrap(), data);
        assert_eq!(resolve_root(&base.join("data/..")).unwrap(), base);
        // Missing paths are still normalized.
        assert_eq!(
            resolve_root(&base.join("missing/../gone")).unwrap(),
            base.join("gone")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_root_keeps_symlink_name() {
        let temp = tempfile::TempDir::new().unwrap();
        let base = std::fs::canonicalize(temp.path()).unwrap();
        std::fs::create_dir(base.join("data")).unwrap();
        std::os::unix::fs::symlink(base.join("data"), base.join("link")).unwrap();

        assert_eq!(resolve_root(&base.join("link")).unwrap(), base.join("link"));
        std::fs::create_dir(base.join("data/inner")).unwrap();
        assert_eq!(
            resolve_root(&base.join("link/inner")).unwrap(),
            base.join("data/inner")
        );
    }
}
