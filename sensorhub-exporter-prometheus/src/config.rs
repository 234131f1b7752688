//! Configuration for the Prometheus endpoint.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9464").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Default labels to add to all metrics.
    #[serde(default)]
    pub default_labels: HashMap<String, String>,

    /// Metric name prefix (default: none).
    #[serde(default)]
    pub prefix: String,

    /// Metric filtering settings.
    #[serde(default)]
    pub filters: FilterConfig,
}

fn default_listen() -> String {
    "0.0.0.0:9464".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            default_labels: HashMap::new(),
            prefix: String::new(),
            filters: FilterConfig::default(),
        }
    }
}

/// Metric filtering configuration.
///
/// Patterns match the dotted instrument name, e.g. `sensor.*` or
/// `hardware.storage.*`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Glob patterns for metrics to include (empty = all).
    #[serde(default)]
    pub include_metrics: Vec<String>,

    /// Glob patterns for metrics to exclude.
    #[serde(default)]
    pub exclude_metrics: Vec<String>,
}

impl PrometheusConfig {
    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: PrometheusConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        if !self.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        for pattern in self
            .filters
            .include_metrics
            .iter()
            .chain(&self.filters.exclude_metrics)
        {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(ConfigError::Validation(format!(
                    "Invalid metric pattern '{}': {}",
                    pattern, e
                )));
            }
        }

        Ok(())
    }

    /// The listen address as a socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|_| {
            ConfigError::Validation(format!("Invalid listen address: {}", self.listen))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = PrometheusConfig::parse("{}").unwrap();

        assert_eq!(config.listen, "0.0.0.0:9464");
        assert_eq!(config.path, "/metrics");
        assert!(config.prefix.is_empty());
        assert!(config.default_labels.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            listen: "127.0.0.1:9100",
            path: "/prometheus/metrics",
            prefix: "home",
            default_labels: { site: "garage" },
            filters: {
                include_metrics: ["sensor.*"],
                exclude_metrics: ["sensor.rssi"]
            }
        }"#;

        let config = PrometheusConfig::parse(json).unwrap();
        assert_eq!(config.listen_addr().unwrap().port(), 9100);
        assert_eq!(config.path, "/prometheus/metrics");
        assert_eq!(config.default_labels.get("site"), Some(&"garage".to_string()));
        assert_eq!(config.filters.exclude_metrics, vec!["sensor.rssi"]);
    }

    #[test]
    fn test_validate_invalid_listen() {
        let result = PrometheusConfig::parse(r#"{ listen: "not-an-address" }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let result = PrometheusConfig::parse(r#"{ path: "metrics" }"#);
        assert!(result.unwrap_err().to_string().contains("must start with /"));
    }

    #[test]
    fn test_validate_invalid_pattern() {
        let result = PrometheusConfig::parse(r#"{ filters: { include_metrics: ["sensor.[" ] } }"#);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
