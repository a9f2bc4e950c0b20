//! Queries over the metadata cache.

use std::path::PathBuf;

use globset::{GlobBuilder, GlobMatcher};

use dupes_core::ContentHash;

use crate::cache::MetadataCache;

/// Every cached path with this content hash and size, sorted.
pub fn find_by_content(cache: &MetadataCache, hash: &ContentHash, size: u64) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = cache
        .iter()
        .filter(|(_, stats)| stats.size == size && stats.content_hash.as_ref() == Some(hash))
        .map(|(identity, _)| identity.path())
        .collect();
    paths.sort();
    paths
}

/// A case-insensitive SQL `LIKE` pattern matched against full paths.
///
/// `%` matches any run of characters, `/` included, and `_` matches
/// exactly one character. Every other character is literal.
#[derive(Debug, Clone)]
pub struct NamePattern {
    pattern: String,
    matcher: GlobMatcher,
}

impl NamePattern {
    /// Compile a `LIKE` pattern.
    pub fn new(pattern: &str) -> Result<Self, globset::Error> {
        let glob = GlobBuilder::new(&like_to_glob(pattern))
            .case_insensitive(true)
            .literal_separator(false)
            .backslash_escape(true)
            .build()?;
        Ok(Self {
            pattern: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    /// The pattern as given.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Check if `path` matches.
    pub fn is_match(&self, path: &std::path::Path) -> bool {
        self.matcher.is_match(path)
    }
}

fn like_to_glob(pattern: &str) -> String {
    let mut glob = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        match c {
            '%' => glob.push('*'),
            '_' => glob.push('?'),
            '*' | '?' | '[' | ']' | '{' | '}' | '\\' => {
                glob.push('\\');
                glob.push(c);
            }
            _ => glob.push(c),
        }
    }
    glob
}

/// Every cached path matching `pattern`, sorted.
pub fn find_by_name(cache: &MetadataCache, pattern: &NamePattern) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = cache
        .iter()
        .map(|(identity, _)| identity.path())
        .filter(|path| pattern.is_match(path))
        .collect();
    paths.sort();
    paths
}
