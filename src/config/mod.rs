//! Configuration management for Folio.
//!
//! Configuration is read from `~/.config/folio/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Local, Offset};
use serde::Deserialize;

use crate::listener::DEFAULT_BUS_CAPACITY;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub feeds: FeedConfig,
}

/// Where the manga server lives and how to talk to it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:4567".to_string(),
            timeout_secs: 30,
            user_agent: concat!("folio/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Paging and reconciliation behaviour shared by every feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Maximum concurrent refetches while reconciling one change batch
    pub refetch_concurrency: usize,
    /// Buffered change batches per feed before a slow feed starts lagging
    pub bus_capacity: usize,
    /// `strftime` format of the date headers in the updates feed
    pub date_format: String,
    /// Offset used to decide which day an update belongs to (None = local time)
    pub utc_offset_minutes: Option<i32>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            refetch_concurrency: 5,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            date_format: "%Y-%m-%d".to_string(),
            utc_offset_minutes: None,
        }
    }
}

impl FeedConfig {
    /// The offset date headers are computed in.
    ///
    /// Out-of-range values fall back to local time.
    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes.saturating_mul(60)))
            .unwrap_or_else(|| Local::now().offset().fix())
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`, creating it with defaults when missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            Self::create_default_config(path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/folio/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("folio").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# Folio Configuration

[server]
# Base URL of the manga server
url = "http://127.0.0.1:4567"

# Request timeout in seconds
timeout_secs = 30

[feeds]
# Maximum concurrent refreshes when the server reports changed entries
refetch_concurrency = 5

# Change notifications buffered per open feed
bus_capacity = 64

# Date header format in the updates feed (strftime)
date_format = "%Y-%m-%d"

# Day boundary for the updates feed, in minutes east of UTC.
# Leave unset to use the local timezone.
# utc_offset_minutes = 0
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
