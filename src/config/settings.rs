//! Configuration settings and validation.

use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Default debounce window for filesystem events.
const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Default maximum number of query results.
const DEFAULT_QUERY_LIMIT: usize = 10;

/// Main configuration for the findex daemon.
///
/// Immutable for the lifetime of the sync controller.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory whose contents are indexed and watched.
    pub root_dir: PathBuf,

    /// Directory holding index generations and the current-generation pointer.
    pub index_dir: PathBuf,

    /// Debounce window for filesystem events, in milliseconds.
    pub debounce_ms: u64,

    /// Maximum number of results returned per query.
    pub query_limit: usize,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON logging output.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            index_dir: PathBuf::from("./findex-index"),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            query_limit: DEFAULT_QUERY_LIMIT,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.debounce_ms == 0 {
            return Err(Error::config("debounce_ms cannot be 0"));
        }

        if self.debounce_ms > 60_000 {
            return Err(Error::config("debounce_ms cannot exceed 60000 (1 minute)"));
        }

        if self.query_limit == 0 {
            return Err(Error::config("query_limit cannot be 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.root_dir.as_os_str().is_empty() {
            return Err(Error::config("root_dir cannot be empty"));
        }

        if self.index_dir.as_os_str().is_empty() {
            return Err(Error::config("index_dir cannot be empty"));
        }

        if self.index_dir == self.root_dir {
            return Err(Error::config("index_dir cannot equal root_dir"));
        }

        Ok(())
    }

    /// Get the debounce window as a `Duration`.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Whether the index directory lives inside the watched root.
    ///
    /// When it does, index writes must be excluded from scans and watch
    /// events or every rebuild would re-trigger itself.
    #[must_use]
    pub fn index_inside_root(&self) -> bool {
        self.index_dir.starts_with(&self.root_dir)
    }
}
