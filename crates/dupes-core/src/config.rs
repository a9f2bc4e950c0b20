//! Walk configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Configuration for walking the input trees.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root paths to walk, files or directories, in order.
    pub roots: Vec<PathBuf>,

    /// Extra glob patterns to exclude, on top of the built-in denylist.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Number of threads for directory listing (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,
}

fn default_true() -> bool {
    true
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.roots {
            Some(ref roots) if roots.is_empty() => Err("At least one root path is required".to_string()),
            Some(ref roots) if roots.iter().any(|r| r.as_os_str().is_empty()) => {
                Err("Root path cannot be empty".to_string())
            }
            Some(_) => Ok(()),
            None => Err("Root paths are required".to_string()),
        }
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for walking the given roots.
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            ignore_patterns: Vec::new(),
            include_hidden: true,
            threads: 0,
        }
    }

    /// Check if hidden files should be skipped.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }
}
