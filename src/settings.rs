//! User settings read from `config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use dupes_analyze::{DEFAULT_AUTOSAVE_INTERVAL, DEFAULT_REMOVAL_COMMAND};

/// Settings file contents; every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Cache file location.
    pub cache_path: Option<PathBuf>,
    /// Seconds between automatic cache saves.
    pub autosave_secs: u64,
    /// Extra glob patterns to exclude.
    pub ignore_patterns: Vec<String>,
    /// Walk entries whose name starts with a dot.
    pub include_hidden: bool,
    /// Directory listing threads (0 = auto-detect).
    pub threads: usize,
    /// Hash cache misses in parallel.
    pub parallel_hashing: bool,
    /// Command prefixed to removal directives.
    pub removal_command: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_path: None,
            autosave_secs: DEFAULT_AUTOSAVE_INTERVAL.as_secs(),
            ignore_patterns: Vec::new(),
            include_hidden: true,
            threads: 0,
            parallel_hashing: true,
            removal_command: DEFAULT_REMOVAL_COMMAND.to_string(),
        }
    }
}

impl Settings {
    /// Load settings.
    ///
    /// An explicitly named file must exist and parse. Without one, the
    /// default location is read if present and defaults apply otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_settings_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Parse a settings file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read settings file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    /// Autosave interval as a duration.
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_secs)
    }

    /// Cache location: the flag, then the settings file, then the default.
    pub fn cache_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.cache_path.clone())
            .unwrap_or_else(default_cache_path)
    }
}

/// Default location of the settings file.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dupes").join("config.toml"))
}

/// Default location of the cache file.
pub fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dupes")
        .join("cache.json")
}
