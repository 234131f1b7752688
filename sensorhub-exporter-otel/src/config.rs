//! Configuration for the OTLP exporter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// OpenTelemetry OTLP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtelConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317" for gRPC).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Protocol: "grpc" or "http".
    #[serde(default)]
    pub protocol: OtlpProtocol,

    /// Headers sent with every OTLP/HTTP request (e.g., for authentication).
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Export interval in seconds.
    #[serde(default = "default_export_interval")]
    pub export_interval_secs: u64,

    /// Export timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Resource attributes added to all telemetry.
    #[serde(default)]
    pub resource: HashMap<String, String>,

    /// Service name for the OTEL resource.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Service version for the OTEL resource.
    #[serde(default)]
    pub service_version: Option<String>,
}

fn default_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_export_interval() -> u64 {
    10
}

fn default_timeout() -> u64 {
    30
}

fn default_service_name() -> String {
    "sensorhub".to_string()
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            protocol: OtlpProtocol::default(),
            headers: HashMap::new(),
            export_interval_secs: default_export_interval(),
            timeout_secs: default_timeout(),
            resource: HashMap::new(),
            service_name: default_service_name(),
            service_version: None,
        }
    }
}

impl OtelConfig {
    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: OtelConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::Validation(
                "OTLP endpoint cannot be empty".to_string(),
            ));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "OTLP endpoint must be an http(s) URL: {}",
                self.endpoint
            )));
        }
        if self.export_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Export interval must be greater than 0".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Export timeout must be greater than 0".to_string(),
            ));
        }
        if self.service_name.is_empty() {
            return Err(ConfigError::Validation(
                "Service name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Get export interval as Duration.
    pub fn export_interval(&self) -> Duration {
        Duration::from_secs(self.export_interval_secs)
    }

    /// Get timeout as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// OTLP protocol selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    /// gRPC protocol (port 4317).
    #[default]
    Grpc,
    /// HTTP/protobuf protocol (port 4318).
    Http,
}
