//! Configuration for the ping instrumentation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sensorhub_framework::AdapterError;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ConfigError> for AdapterError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Parse(e) => AdapterError::ConfigParse(e.to_string()),
            ConfigError::Validation(msg) => AdapterError::ConfigValidation(msg),
        }
    }
}

/// Ping instrumentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingConfig {
    /// Value of the `host` tag. Falls back to the service-wide host.
    #[serde(default)]
    pub host: Option<String>,

    /// Probe interval in milliseconds (default: 10000).
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Per-probe timeout in milliseconds (default: 5000).
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Targets to probe.
    #[serde(default)]
    pub targets: Vec<PingTarget>,
}

/// One probed address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingTarget {
    /// Host name or IP address, optionally with a port.
    pub address: String,

    /// Display name (default: the address).
    #[serde(default)]
    pub name: Option<String>,

    /// TCP port used when `address` has none (default: 80).
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_interval() -> u64 {
    10000
}

fn default_timeout() -> u64 {
    5000
}

fn default_port() -> u16 {
    80
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            host: None,
            interval_ms: default_interval(),
            timeout_ms: default_timeout(),
            targets: Vec::new(),
        }
    }
}

impl PingTarget {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            port: default_port(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl PingConfig {
    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: PingConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::Validation("ping.interval_ms must be > 0".into()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation("ping.timeout_ms must be > 0".into()));
        }
        if self.targets.is_empty() {
            return Err(ConfigError::Validation(
                "ping: at least one target required".into(),
            ));
        }
        for target in &self.targets {
            if target.address.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "ping: target address cannot be empty".into(),
                ));
            }
        }
        Ok(())
    }
}
