//! Core configuration types.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::defaults::*;
use super::validation::{self, ValidationError};
use super::{HistoryConfig, LimitsConfig, ListenConfig, UserConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {}", format_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Bouncer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    #[serde(default)]
    pub server: ServerConfig,
    /// Downstream listener.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Connection timeouts.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Queue and line limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Message store.
    #[serde(default)]
    pub history: HistoryConfig,
    /// Upstream reconnect backoff.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// String cache maintenance.
    #[serde(default)]
    pub intern: InternConfig,
    /// Bouncer accounts.
    #[serde(default, rename = "user")]
    pub users: Vec<UserConfig>,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        validation::validate(&config).map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name used as the prefix of every bouncer-generated message.
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Message of the day, one entry per line. Absent sends ERR_NOMOTD.
    #[serde(default)]
    pub motd: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            motd: None,
        }
    }
}

/// Connection timeouts, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    /// Deadline for a downstream to finish registering.
    #[serde(default = "default_registration_timeout")]
    pub registration: u64,
    /// Deadline for an upstream TCP connect.
    #[serde(default = "default_upstream_connect_timeout")]
    pub upstream_connect: u64,
}

impl TimeoutsConfig {
    pub fn registration(&self) -> Duration {
        Duration::from_secs(self.registration)
    }

    pub fn upstream_connect(&self) -> Duration {
        Duration::from_secs(self.upstream_connect)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            registration: default_registration_timeout(),
            upstream_connect: default_upstream_connect_timeout(),
        }
    }
}

/// Exponential backoff bounds for upstream reconnects, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_initial")]
    pub initial: u64,
    #[serde(default = "default_reconnect_max")]
    pub max: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial: default_reconnect_initial(),
            max: default_reconnect_max(),
        }
    }
}

/// String cache reset schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct InternConfig {
    /// Seconds between cache resets.
    #[serde(default = "default_intern_reset_interval")]
    pub reset_interval: u64,
}

impl Default for InternConfig {
    fn default() -> Self {
        Self {
            reset_interval: default_intern_reset_interval(),
        }
    }
}
