//! Configuration for the hardware instrumentation.

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

/// Hardware instrumentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysinfoConfig {
    /// Value of the `host` tag. Falls back to the service-wide host.
    #[serde(default)]
    pub host: Option<String>,

    /// Poll interval in milliseconds (default: 5000).
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Per-read timeout in milliseconds (default: 2000).
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Collect CPU load (default: true).
    #[serde(default = "default_true")]
    pub cpu: bool,

    /// Collect memory usage (default: true).
    #[serde(default = "default_true")]
    pub memory: bool,

    /// Mount point filters.
    #[serde(default)]
    pub disk: DiskConfig,

    /// Network interface filters.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Mount point selection. Patterns are globs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Only include matching mount points (empty = include all).
    #[serde(default)]
    pub include: Vec<String>,

    /// Exclude matching mount points.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Exclude pseudo filesystems (tmpfs, devtmpfs, etc.) (default: true).
    #[serde(default = "default_true")]
    pub exclude_pseudo: bool,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include: Vec::new(),
            exclude: Vec::new(),
            exclude_pseudo: true,
        }
    }
}

/// Network interface selection. Patterns are globs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Only include matching interfaces (empty = include all).
    #[serde(default)]
    pub include: Vec<String>,

    /// Exclude matching interfaces.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Exclude loopback interfaces (default: true).
    #[serde(default = "default_true")]
    pub exclude_loopback: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include: Vec::new(),
            exclude: Vec::new(),
            exclude_loopback: true,
        }
    }
}

fn default_interval() -> u64 {
    5000
}

fn default_timeout() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

impl Default for SysinfoConfig {
    fn default() -> Self {
        Self {
            host: None,
            interval_ms: default_interval(),
            timeout_ms: default_timeout(),
            cpu: true,
            memory: true,
            disk: DiskConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

fn check_patterns(section: &str, patterns: &[String]) -> Result<(), ConfigError> {
    for pattern in patterns {
        glob::Pattern::new(pattern).map_err(|e| {
            ConfigError::Validation(format!(
                "sysinfo.{}: invalid pattern '{}': {}",
                section, pattern, e
            ))
        })?;
    }
    Ok(())
}

impl SysinfoConfig {
    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: SysinfoConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 || self.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "sysinfo: interval_ms and timeout_ms must be > 0".into(),
            ));
        }
        if !self.cpu && !self.memory && !self.disk.enabled && !self.network.enabled {
            return Err(ConfigError::Validation(
                "sysinfo: at least one metric type must be enabled".into(),
            ));
        }
        check_patterns("disk.include", &self.disk.include)?;
        check_patterns("disk.exclude", &self.disk.exclude)?;
        check_patterns("network.include", &self.network.include)?;
        check_patterns("network.exclude", &self.network.exclude)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SysinfoConfig::parse("{}").unwrap();
        assert!(config.cpu && config.memory);
        assert!(config.disk.enabled && config.disk.exclude_pseudo);
        assert!(config.network.exclude_loopback);
        assert_eq!(config.interval_ms, 5000);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = SysinfoConfig::parse(r#"{ network: { include: ["eth[0"] } }"#);
        assert!(matches!(result, Err(ConfigError::Validation(msg)) if msg.contains("eth[0")));
    }

    #[test]
    fn test_nothing_enabled_rejected() {
        let result = SysinfoConfig::parse(
            "{ cpu: false, memory: false, disk: { enabled: false }, network: { enabled: false } }",
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
