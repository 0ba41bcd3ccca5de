//! Engine configuration.
//!
//! Handles loading, validating, and merging a TOML config file. Stock
//! defaults are the base layer; a user file overrides any subset of keys, and
//! command-line flags override the result.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! wallpaper_dir = "wallpaper"              # Directory tree to index and watch
//! database = ".ratio-cache/index.db"       # SQLite index file
//! extensions = ["jpg", "jpeg", "png", "gif", "webp"]
//! include_hidden = false                   # Index dotfiles and dot-directories
//!
//! [watcher]
//! enabled = true                           # Follow filesystem changes live
//!
//! [persistence]
//! write_attempts = 3                       # Tries per failed store write
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse — override just the values you want:
//!
//! ```toml
//! wallpaper_dir = "/srv/wallpapers"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::scan::ScanFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine configuration loaded from a TOML file.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Root of the directory tree to index.
    pub wallpaper_dir: PathBuf,
    /// SQLite database file holding the persistent index.
    pub database: PathBuf,
    /// File extensions to index, matched case-insensitively, without the dot.
    pub extensions: Vec<String>,
    /// Index files and directories whose names start with a dot.
    pub include_hidden: bool,
    /// Filesystem watching.
    pub watcher: WatcherConfig,
    /// Store write retry policy.
    pub persistence: PersistenceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wallpaper_dir: PathBuf::from("wallpaper"),
            database: PathBuf::from(".ratio-cache/index.db"),
            extensions: ["jpg", "jpeg", "png", "gif", "webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            include_hidden: false,
            watcher: WatcherConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "extensions must not be empty".into(),
            ));
        }
        if let Some(bad) = self
            .extensions
            .iter()
            .find(|e| e.trim_start_matches('.').is_empty())
        {
            return Err(ConfigError::Validation(format!(
                "extensions contains an empty entry: '{bad}'"
            )));
        }
        if self.persistence.write_attempts == 0 {
            return Err(ConfigError::Validation(
                "persistence.write_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Which paths under `wallpaper_dir` are indexed.
    pub fn scan_filter(&self) -> ScanFilter {
        ScanFilter::new(&self.extensions, self.include_hidden)
    }
}

/// Filesystem watcher settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatcherConfig {
    /// When false the index is built once at startup and only refreshed by
    /// explicit reanalysis and self-healing.
    pub enabled: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Store write retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PersistenceConfig {
    /// Total attempts for a store write, counting the first one.
    pub write_attempts: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { write_attempts: 3 }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(EngineConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<EngineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: EngineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from an optional file.
///
/// `None` yields the stock defaults. A given path must exist.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let overlay = path.map(load_raw_config).transpose()?;
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# ratio-cache Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Relative paths are resolved against the working directory.
# Unknown keys will cause an error.

# Directory tree to index. Subdirectories are included.
wallpaper_dir = "wallpaper"

# SQLite file holding the persistent index. Parent directories are created.
database = ".ratio-cache/index.db"

# File extensions to index (case-insensitive, without the dot).
extensions = ["jpg", "jpeg", "png", "gif", "webp"]

# Index files and directories whose names start with a dot.
include_hidden = false

# ---------------------------------------------------------------------------
# Filesystem watcher
# ---------------------------------------------------------------------------
[watcher]
# Follow creates, modifications, renames and deletions as they happen.
# When disabled, the index is built at startup and refreshed only by
# `reanalyze` and by queries that find files missing.
enabled = true

# ---------------------------------------------------------------------------
# Persistence
# ---------------------------------------------------------------------------
[persistence]
# Total attempts for an index write that the database rejects. Failed writes
# are retried when the indexing queue goes idle and at shutdown. Queries keep
# answering from memory in the meantime.
write_attempts = 3
"##
}
