//! Configuration file parser for `reaper.toml`.
//!
//! The config file is optional. A missing or empty file yields
//! `Config::default()`, and unknown keys are accepted but logged as warnings.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Scanner configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target wall time for one scan cycle.
    pub scan_interval_seconds: u64,

    /// Images must be strictly larger than this to be kept.
    pub minimum_image_size_bytes: u64,

    /// Root of the `i/<year>/<month>/<day>` image tree.
    pub media_cache_path: PathBuf,

    pub database_path: PathBuf,

    /// Verbose logging and per-cycle timing.
    pub debug: bool,

    /// Stop a source's import at the first failed write instead of
    /// logging it and moving on.
    pub propagate_persistence_errors: bool,

    /// Per-attempt timeout for feed requests.
    pub request_timeout_seconds: u64,

    /// Timeout for each image HEAD probe.
    pub probe_timeout_seconds: u64,

    /// Permit feed and image URLs that resolve to loopback or private
    /// addresses.
    pub allow_private_hosts: bool,

    pub category_cache_ttl_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_interval_seconds: 300,
            minimum_image_size_bytes: 2048,
            media_cache_path: PathBuf::from("./media"),
            database_path: PathBuf::from("reaper.db"),
            debug: false,
            propagate_persistence_errors: false,
            request_timeout_seconds: 30,
            probe_timeout_seconds: 10,
            allow_private_hosts: false,
            category_cache_ttl_seconds: 300,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "scan_interval_seconds",
        "minimum_image_size_bytes",
        "media_cache_path",
        "database_path",
        "debug",
        "propagate_persistence_errors",
        "request_timeout_seconds",
        "probe_timeout_seconds",
        "allow_private_hosts",
        "category_cache_ttl_seconds",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            interval = config.scan_interval_seconds,
            debug = config.debug,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration text, warning about keys it does not recognise.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        Ok(toml::from_str(content)?)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn category_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.category_cache_ttl_seconds)
    }
}

// ============================================================================
// Tests
// ============================================================================
