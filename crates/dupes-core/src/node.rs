//! Hashes and per-file cache records.

use std::fmt;
use std::path::{Path, PathBuf};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// BLAKE3 digest of a file's content or of a directory's child hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse a 64 character hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }

    /// Get the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Key of an aggregate: a file content hash or a directory hash.
///
/// The two variants never compare equal, so a directory can not collide
/// with a file even if their digests happened to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "hash", rename_all = "lowercase")]
pub enum NodeHash {
    /// Digest of a regular file's bytes.
    File(ContentHash),
    /// Digest of a directory's sorted child hashes.
    Directory(ContentHash),
}

impl NodeHash {
    /// Tag byte folded into directory digests.
    pub fn tag(&self) -> u8 {
        match self {
            NodeHash::File(_) => b'f',
            NodeHash::Directory(_) => b'd',
        }
    }

    /// The underlying digest.
    pub fn digest(&self) -> &ContentHash {
        match self {
            NodeHash::File(hash) | NodeHash::Directory(hash) => hash,
        }
    }

    /// Check if this is a directory hash.
    pub fn is_directory(&self) -> bool {
        matches!(self, NodeHash::Directory(_))
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeHash::File(hash) => write!(f, "{hash}"),
            NodeHash::Directory(hash) => write!(f, "/{hash}"),
        }
    }
}

/// Identity of a cache entry: the containing directory and the base name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    /// Absolute path of the containing directory.
    pub directory: PathBuf,
    /// File name within `directory`.
    pub name: CompactString,
}

impl FileIdentity {
    /// Create a new identity.
    pub fn new(directory: impl Into<PathBuf>, name: impl Into<CompactString>) -> Self {
        Self {
            directory: directory.into(),
            name: name.into(),
        }
    }

    /// Split a file path into its identity.
    ///
    /// Returns `None` for paths without a UTF-8 file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let directory = path.parent().unwrap_or_else(|| Path::new(""));
        Some(Self::new(directory, name))
    }

    /// Full path of the identified file.
    pub fn path(&self) -> PathBuf {
        self.directory.join(self.name.as_str())
    }
}

/// Last known metadata and content hash of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    /// Content hash, `None` when hashing failed.
    pub content_hash: Option<ContentHash>,
    /// Size in bytes.
    pub size: u64,
    /// Modification time in seconds since the Unix epoch.
    pub modified_at: u64,
}

impl FileStats {
    /// Create a new record.
    pub fn new(content_hash: Option<ContentHash>, size: u64, modified_at: u64) -> Self {
        Self {
            content_hash,
            size,
            modified_at,
        }
    }

    /// Check whether the record still describes a file with this size and mtime.
    pub fn is_fresh(&self, size: u64, modified_at: u64) -> bool {
        self.size == size && self.modified_at == modified_at
    }

    /// Check whether a hash is known.
    pub fn is_hashed(&self) -> bool {
        self.content_hash.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_hex() {
        let hash = ContentHash::new([0xab; 32]);
        assert_eq!(hash.to_hex().len(), 64);
        assert!(hash.to_hex().starts_with("abab"));
    }

    #[test]
    fn test_content_hash_from_hex() {
        let hash = ContentHash::new([0x3c; 32]);
        assert_eq!(ContentHash::from_hex(&hash.to_hex()), Some(hash));
        assert_eq!(ContentHash::from_hex("abc"), None);
        assert_eq!(ContentHash::from_hex(&"zz".repeat(32)), None);
    }

    #[test]
    fn test_node_hash_variants_differ() {
        let digest = ContentHash::new([1; 32]);
        assert_ne!(NodeHash::File(digest), NodeHash::Directory(digest));
        assert_ne!(NodeHash::File(digest).tag(), NodeHash::Directory(digest).tag());
        assert!(NodeHash::Directory(digest).to_string().starts_with('/'));
    }

    #[test]
    fn test_identity_from_path() {
        let identity = FileIdentity::from_path(Path::new("/data/photos/a.jpg")).unwrap();
        assert_eq!(identity.directory, PathBuf::from("/data/photos"));
        assert_eq!(identity.name.as_str(), "a.jpg");
        assert_eq!(identity.path(), PathBuf::from("/data/photos/a.jpg"));
    }

    #[test]
    fn test_file_stats_freshness() {
        let stats = FileStats::new(None, 10, 1_700_000_000);
        assert!(stats.is_fresh(10, 1_700_000_000));
        assert!(!stats.is_fresh(11, 1_700_000_000));
        assert!(!stats.is_fresh(10, 1_700_000_001));
        assert!(!stats.is_hashed());
    }
}
