//! Bottom-up file system walker for dupes.
//!
//! This crate enumerates the input roots using jwalk and hands the
//! result out in post-order, so that a consumer sees every file and
//! sub-directory of a directory before the directory itself. That order
//! is what lets the hashing engine derive a directory hash from already
//! computed child hashes.
//!
//! - **Symbolic links** are never followed and never yielded
//! - **Exclusions**: platform metadata and editor swap/lock files are
//!   dropped silently, plus any configured glob patterns
//! - **Diagnostics**: missing roots, unlistable directories and non UTF-8
//!   names become [`ScanWarning`]s instead of errors
//!
//! # Example
//!
//! ```rust,no_run
//! use dupes_scan::{ScanConfig, TreeWalker, WalkEntry};
//!
//! let walker = TreeWalker::new(ScanConfig::new(["/path/to/scan"])).unwrap();
//! for entry in walker.walk() {
//!     match entry {
//!         WalkEntry::File(file) => println!("file {}", file.path.display()),
//!         WalkEntry::Directory(dir) => println!("done {}", dir.path.display()),
//!     }
//! }
//! ```

mod exclude;
mod walker;

pub use exclude::{DEFAULT_EXCLUDES, ExcludeError, ExclusionRules};
pub use walker::{PostOrder, TreeWalker, Walk};

// Re-export core types for convenience
pub use dupes_core::{
    DirectoryEntry, FileEntry, ScanConfig, ScanWarning, WalkEntry, WalkStats, WarningKind,
};
