//! Error and diagnostic types shared by the walker and the hashing engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from hashing a single file.
#[derive(Debug, Error)]
pub enum HashError {
    /// The file could not be read (permission denied, vanished, I/O error).
    #[error("Cannot read {path}: {source}")]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No hashing mechanism is available at all.
    #[error("No hashing mechanism available: {reason}")]
    HashToolUnavailable { reason: String },
}

impl HashError {
    /// Create an unreadable-file error with path context.
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::UnreadableFile {
            path: path.into(),
            source,
        }
    }

    /// Check whether the error only affects the one file.
    pub fn is_per_file(&self) -> bool {
        matches!(self, Self::UnreadableFile { .. })
    }
}

/// Kind of diagnostic recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// A root path does not exist.
    MissingRoot,
    /// A root path was skipped because another root already covers it.
    OverlappingRoot,
    /// A symbolic link was given as a root.
    Symlink,
    /// A file name is not valid UTF-8.
    NonUtf8Name,
    /// Error reading a directory listing.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// A file could not be hashed.
    Unhashable,
}

/// Non-fatal diagnostic encountered during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning from an I/O error, classifying permission problems.
    pub fn io(path: impl Into<PathBuf>, error: &std::io::Error, kind: WarningKind) -> Self {
        let path = path.into();
        let kind = match error.kind() {
            std::io::ErrorKind::PermissionDenied => WarningKind::PermissionDenied,
            _ => kind,
        };
        Self {
            message: format!("{}: {error}", path.display()),
            path,
            kind,
        }
    }

    /// Create a missing root warning.
    pub fn missing_root(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Path {} does not exist", path.display()),
            path,
            kind: WarningKind::MissingRoot,
        }
    }

    /// Create a non UTF-8 name warning.
    pub fn non_utf8(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Not a UTF-8 file name: {path:?}"),
            path,
            kind: WarningKind::NonUtf8Name,
        }
    }

    /// Create a warning for a file that could not be hashed.
    pub fn unhashable(path: impl Into<PathBuf>, error: &HashError) -> Self {
        Self {
            path: path.into(),
            message: error.to_string(),
            kind: WarningKind::Unhashable,
        }
    }
}
