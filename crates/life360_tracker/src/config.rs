//! Configuration file parsing and structures.
//!
//! Each `[accounts.<name>]` table corresponds to one config entry: one Life360
//! account with its own coordinator, entity platform and options.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use crate::device_tracker::NameFilter;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Key = account name, Value = per-account options
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"life360_tracker::device_tracker" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the per-target filter for the tracing subscriber.
    pub fn targets(&self) -> Targets {
        let mut targets = Targets::new().with_default(LevelFilter::from(self.level));
        for (target, level) in &self.overrides {
            targets = targets.with_target(target.clone(), LevelFilter::from(*level));
        }
        targets
    }
}

/// Options for a single account.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// Updates reporting a GPS accuracy worse than this (meters) are ignored
    #[serde(default)]
    pub max_gps_accuracy: Option<u32>,

    /// Members moving faster than this are reported as driving
    #[serde(default)]
    pub driving_speed: Option<f64>,

    /// Entity namespace, prepended to every entity id of this account
    #[serde(default)]
    pub prefix: Option<String>,

    /// Which circles to include (all when unset)
    #[serde(default)]
    pub circles: Option<NameFilter>,

    /// Which members to track (all when unset)
    #[serde(default)]
    pub members: Option<NameFilter>,
}

/// The read-only options a coordinator carries for its config entry.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EntryOptions {
    pub max_gps_accuracy: Option<u32>,
    pub driving_speed: Option<f64>,
    pub prefix: Option<String>,
}

impl AccountConfig {
    pub fn options(&self) -> EntryOptions {
        EntryOptions {
            max_gps_accuracy: self.max_gps_accuracy,
            driving_speed: self.driving_speed,
            prefix: self.prefix.clone(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, account) in &self.accounts {
            if let Some(speed) = account.driving_speed {
                if !speed.is_finite() || speed < 0.0 {
                    return Err(ConfigError::Invalid(
                        name.clone(),
                        format!("driving_speed must be a non-negative number, got {}", speed),
                    ));
                }
            }
            if let Some(prefix) = &account.prefix {
                if prefix.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        name.clone(),
                        "prefix must not be empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration for account {0}: {1}")]
    Invalid(String, String),
}
