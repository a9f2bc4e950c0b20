//! Content hashing for files and directories.

use std::path::Path;

use blake3::Hasher;

use dupes_core::{ContentHash, HashError, NodeHash};

/// Key-derivation context separating directory digests from file digests.
const DIRECTORY_CONTEXT: &str = "dupes 2024-01-01 directory hash of sorted child hashes";

/// Computes a content hash for a single file.
///
/// Implementations must be deterministic for identical bytes regardless
/// of the path or metadata of the file.
pub trait ContentHasher: Send + Sync {
    /// Hash the bytes of the file at `path`.
    fn hash_file(&self, path: &Path) -> Result<ContentHash, HashError>;
}

impl<H: ContentHasher + ?Sized> ContentHasher for &H {
    fn hash_file(&self, path: &Path) -> Result<ContentHash, HashError> {
        (**self).hash_file(path)
    }
}

/// BLAKE3 hasher; large files are memory-mapped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl Blake3Hasher {
    /// Create a new hasher.
    pub fn new() -> Self {
        Self
    }
}

impl ContentHasher for Blake3Hasher {
    fn hash_file(&self, path: &Path) -> Result<ContentHash, HashError> {
        let mut hasher = Hasher::new();
        hasher
            .update_mmap(path)
            .map_err(|e| HashError::unreadable(path, e))?;
        Ok(ContentHash::new(*hasher.finalize().as_bytes()))
    }
}

/// Hash a directory from the hashes of its immediate children.
///
/// The children are sorted first, so the result depends only on the
/// multiset of child hashes and not on listing order.
pub fn hash_directory(children: &[NodeHash]) -> NodeHash {
    let mut sorted = children.to_vec();
    sorted.sort_unstable();

    let mut hasher = Hasher::new_derive_key(DIRECTORY_CONTEXT);
    for child in &sorted {
        hasher.update(&[child.tag()]);
        hasher.update(child.digest().as_bytes());
    }
    NodeHash::Directory(ContentHash::new(*hasher.finalize().as_bytes()))
}

/// Hash an in-memory buffer the same way [`Blake3Hasher`] hashes a file.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::new(*blake3::hash(bytes).as_bytes())
}
