//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/sessionlens/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/sessionlens/` (~/.config/sessionlens/)
//! - Data: `$XDG_DATA_HOME/sessionlens/` (~/.local/share/sessionlens/)
//! - State/Logs: `$XDG_STATE_HOME/sessionlens/` (~/.local/state/sessionlens/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Pipeline resource limits
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Polling fallback budget
    #[serde(default)]
    pub poll: PollConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pipeline resource limits
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Maximum files accepted per submission; extras are dropped with a warning
    #[serde(default = "default_max_input_files")]
    pub max_input_files: usize,

    /// Session lifetime in hours before it becomes purgeable
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    /// Buffered events per subscriber channel
    #[serde(default = "default_event_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_input_files: default_max_input_files(),
            session_ttl_hours: default_session_ttl_hours(),
            event_channel_capacity: default_event_capacity(),
        }
    }
}

fn default_max_input_files() -> usize {
    10
}

fn default_session_ttl_hours() -> i64 {
    24
}

fn default_event_capacity() -> usize {
    64
}

/// Polling fallback budget
#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    /// Hard ceiling on poll attempts
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,

    /// Delay between poll attempts in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_poll_attempts(),
            interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_poll_attempts() -> u32 {
    30
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    /// when no config file exists.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Path to the config file
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("sessionlens/config.toml")
    }

    /// Path to the SQLite database
    pub fn database_path() -> PathBuf {
        xdg_data_home().join("sessionlens/data.db")
    }

    /// Directory for log files
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("sessionlens")
    }

    /// Path to the current log file
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("sessionlens.log")
    }
}
