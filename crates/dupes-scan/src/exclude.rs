//! Exclusion rules for the tree walker.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;

/// Patterns always excluded: platform metadata and editor lock/swap files.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.AppleDouble",
    "**/.AppleDouble/**",
    "**/.DS_Store",
    "*.swp",
    "*.~lock.*",
];

/// Invalid exclusion pattern.
#[derive(Debug, Error)]
#[error("Invalid exclusion pattern {pattern:?}: {source}")]
pub struct ExcludeError {
    pattern: String,
    #[source]
    source: globset::Error,
}

/// Compiled set of exclusion globs matched against absolute paths.
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    set: GlobSet,
}

impl ExclusionRules {
    /// Build the default denylist plus the given extra patterns.
    ///
    /// A pattern without a `/` matches a file or directory name anywhere
    /// in the tree.
    pub fn new<S: AsRef<str>>(extra: &[S]) -> Result<Self, ExcludeError> {
        let mut builder = GlobSetBuilder::new();
        let patterns = DEFAULT_EXCLUDES
            .iter()
            .map(|p| p.to_string())
            .chain(extra.iter().map(|p| normalize(p.as_ref())));

        for pattern in patterns {
            let glob = Glob::new(&pattern).map_err(|source| ExcludeError {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }

        let set = builder.build().map_err(|source| ExcludeError {
            pattern: String::new(),
            source,
        })?;
        Ok(Self { set })
    }

    /// Check if a path is excluded.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.set.is_match(path)
    }
}

fn normalize(pattern: &str) -> String {
    if pattern.contains('/') {
        pattern.to_string()
    } else {
        format!("**/{pattern}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_excludes() {
        let rules = ExclusionRules::new::<&str>(&[]).unwrap();
        assert!(rules.is_excluded(Path::new("/home/u/photos/.DS_Store")));
        assert!(rules.is_excluded(Path::new("/home/u/notes/.todo.txt.swp")));
        assert!(rules.is_excluded(Path::new("/home/u/docs/.~lock.budget.ods#")));
        assert!(rules.is_excluded(Path::new("/share/.AppleDouble")));
        assert!(rules.is_excluded(Path::new("/share/.AppleDouble/a.jpg")));

        assert!(!rules.is_excluded(Path::new("/home/u/photos/a.jpg")));
        assert!(!rules.is_excluded(Path::new("/home/u/DS_Store")));
        assert!(!rules.is_excluded(Path::new("/home/u/file.swp.txt")));
    }

    #[test]
    fn test_extra_patterns() {
        let rules = ExclusionRules::new(&["node_modules", "/tmp/**/*.log"]).unwrap();
        assert!(rules.is_excluded(Path::new("/src/app/node_modules")));
        assert!(rules.is_excluded(Path::new("/tmp/a/b/x.log")));
        assert!(!rules.is_excluded(Path::new("/var/x.log")));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = ExclusionRules::new(&["a[b"]).unwrap_err();
        assert!(err.to_string().contains("a[b"));
    }
}
