//! Configuration for the Omron instrumentation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sensorhub_framework::AdapterError;

use crate::frame;

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

/// Omron 2JCIE-BU settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmronConfig {
    /// Value of the `host` tag. Falls back to the service-wide host.
    #[serde(default)]
    pub host: Option<String>,

    /// Poll interval in milliseconds (default: 10000).
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Per-read timeout in milliseconds (default: 2000).
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Sensors, one per serial port.
    #[serde(default)]
    pub devices: Vec<OmronDevice>,

    /// Which readings to expose.
    #[serde(default)]
    pub metrics: MetricToggles,
}

/// One sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmronDevice {
    /// Serial port, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,

    /// Display name (default: the port).
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl OmronDevice {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.port)
    }
}

/// Per-reading switches; all on by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricToggles {
    #[serde(default = "default_true")]
    pub temperature: bool,
    #[serde(default = "default_true")]
    pub humidity: bool,
    #[serde(default = "default_true")]
    pub light: bool,
    #[serde(default = "default_true")]
    pub pressure: bool,
    #[serde(default = "default_true")]
    pub noise: bool,
    #[serde(default = "default_true")]
    pub discomfort: bool,
    #[serde(default = "default_true")]
    pub heat: bool,
    #[serde(default = "default_true")]
    pub etvoc: bool,
    #[serde(default = "default_true")]
    pub eco2: bool,
    #[serde(default = "default_true")]
    pub seismic: bool,
}

impl Default for MetricToggles {
    fn default() -> Self {
        Self {
            temperature: true,
            humidity: true,
            light: true,
            pressure: true,
            noise: true,
            discomfort: true,
            heat: true,
            etvoc: true,
            eco2: true,
            seismic: true,
        }
    }
}

impl MetricToggles {
    /// Enabled field names, in a fixed order.
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            (self.temperature, frame::TEMPERATURE),
            (self.humidity, frame::HUMIDITY),
            (self.light, frame::LIGHT),
            (self.pressure, frame::PRESSURE),
            (self.noise, frame::NOISE),
            (self.discomfort, frame::DISCOMFORT),
            (self.heat, frame::HEAT),
            (self.etvoc, frame::ETVOC),
            (self.eco2, frame::ECO2),
            (self.seismic, frame::SEISMIC),
        ]
        .into_iter()
        .filter_map(|(on, field)| on.then_some(field))
        .collect()
    }
}

fn default_interval() -> u64 {
    10000
}

fn default_timeout() -> u64 {
    2000
}

fn default_baud_rate() -> u32 {
    crate::sensor::BAUD_RATE
}

fn default_true() -> bool {
    true
}

impl Default for OmronConfig {
    fn default() -> Self {
        Self {
            host: None,
            interval_ms: default_interval(),
            timeout_ms: default_timeout(),
            devices: Vec::new(),
            metrics: MetricToggles::default(),
        }
    }
}

impl OmronConfig {
    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: OmronConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 || self.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "omron: interval_ms and timeout_ms must be > 0".into(),
            ));
        }
        if self.devices.is_empty() {
            return Err(ConfigError::Validation(
                "omron: at least one device required".into(),
            ));
        }
        if self.devices.iter().any(|d| d.port.trim().is_empty()) {
            return Err(ConfigError::Validation("omron: port cannot be empty".into()));
        }
        if self.devices.iter().any(|d| d.baud_rate == 0) {
            return Err(ConfigError::Validation("omron: baud_rate must be > 0".into()));
        }
        Ok(())
    }
}
