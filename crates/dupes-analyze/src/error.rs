//! Error types for hashing runs and the metadata cache.

use std::path::PathBuf;

use thiserror::Error;

use dupes_core::{HashError, NodeHash};

/// Errors that abort an aggregation run.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// One hash was seen with two different sizes.
    ///
    /// Either a genuine collision or a bookkeeping bug; neither can be
    /// recovered from.
    #[error(
        "Size mismatch for hash {hash}: {path} has {size} bytes but {existing_size} bytes were recorded for {}",
        display_paths(.existing_paths)
    )]
    SizeMismatch {
        hash: NodeHash,
        path: PathBuf,
        size: u64,
        existing_size: u64,
        existing_paths: Vec<PathBuf>,
    },

    /// Hashing is impossible for every file.
    #[error(transparent)]
    Hash(#[from] HashError),

    /// The run was interrupted.
    #[error("Operation interrupted")]
    Interrupted,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from persisting the metadata cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O failure while writing the cache.
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache could not be serialized.
    #[error("Cannot serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The temporary file could not replace the cache file.
    #[error("Cannot replace cache file {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dupes_core::ContentHash;

    #[test]
    fn test_size_mismatch_names_both_sides() {
        let err = AnalyzeError::SizeMismatch {
            hash: NodeHash::Directory(ContentHash::new([0; 32])),
            path: PathBuf::from("/new"),
            size: 3,
            existing_size: 4,
            existing_paths: vec![PathBuf::from("/old/a"), PathBuf::from("/old/b")],
        };
        let message = err.to_string();
        assert!(message.contains("/new"));
        assert!(message.contains("/old/a, /old/b"));
    }
}
