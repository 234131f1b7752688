//! Configuration for the SwitchBot instrumentation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sensorhub_framework::{AdapterError, MacAddress};

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

/// Kind of SwitchBot device, which decides how its advertisement is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Meter / Meter Plus / CO2 meter.
    Meter,
    /// Plug Mini.
    #[serde(alias = "plugmini")]
    Plug,
}

/// A known device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Bluetooth address, e.g. `C0:12:34:56:78:9A`.
    pub address: String,

    /// Display name (default: the address).
    #[serde(default)]
    pub name: Option<String>,

    #[serde(rename = "type")]
    pub kind: DeviceKind,
}

impl DeviceEntry {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

/// SwitchBot instrumentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchBotConfig {
    /// Value of the `host` tag. Falls back to the service-wide host.
    #[serde(default)]
    pub host: Option<String>,

    /// Staleness threshold in milliseconds. A device silent for longer
    /// disappears from the metrics; `<= 0` disables (default: 300000).
    #[serde(default = "default_staleness")]
    pub staleness_ms: i64,

    /// Drop advertisements weaker than this RSSI (dBm).
    #[serde(default)]
    pub min_rssi: Option<f64>,

    /// Only track configured devices (default: true).
    #[serde(default = "default_true")]
    pub known_only: bool,

    /// UDP address on which to accept relayed advertisements, e.g.
    /// `127.0.0.1:9465`. Without it only in-process senders feed the adapter.
    #[serde(default)]
    pub listen: Option<String>,

    /// Advertisement queue depth between the scanner and the adapter.
    #[serde(default = "default_queue")]
    pub queue_size: usize,

    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

fn default_staleness() -> i64 {
    300_000
}

fn default_true() -> bool {
    true
}

fn default_queue() -> usize {
    256
}

impl Default for SwitchBotConfig {
    fn default() -> Self {
        Self {
            host: None,
            staleness_ms: default_staleness(),
            min_rssi: None,
            known_only: true,
            listen: None,
            queue_size: default_queue(),
            devices: Vec::new(),
        }
    }
}

impl SwitchBotConfig {
    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: SwitchBotConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.known_only && self.devices.is_empty() {
            return Err(ConfigError::Validation(
                "switchbot: known_only requires at least one device".into(),
            ));
        }
        if self.queue_size == 0 {
            return Err(ConfigError::Validation(
                "switchbot: queue_size must be > 0".into(),
            ));
        }
        if let Some(listen) = &self.listen
            && listen.parse::<std::net::SocketAddr>().is_err()
        {
            return Err(ConfigError::Validation(format!(
                "switchbot: invalid listen address '{}'",
                listen
            )));
        }
        for device in &self.devices {
            device.address.parse::<MacAddress>().map_err(|e| {
                ConfigError::Validation(format!("switchbot: device '{}': {}", device.address, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices() {
        let config = SwitchBotConfig::parse(
            r#"{
                devices: [
                    { address: "C0:12:34:56:78:9A", name: "living", type: "meter" },
                    { address: "C0-12-34-56-78-9B", type: "plugmini" },
                ],
            }"#,
        )
        .unwrap();

        assert!(config.known_only);
        assert_eq!(config.staleness_ms, 300_000);
        assert_eq!(config.devices[0].kind, DeviceKind::Meter);
        assert_eq!(config.devices[1].kind, DeviceKind::Plug);
        assert_eq!(config.devices[1].display_name(), "C0-12-34-56-78-9B");
    }

    #[test]
    fn test_bad_address_rejected() {
        let result = SwitchBotConfig::parse(
            r#"{ devices: [{ address: "not-a-mac", type: "meter" }] }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_known_only_without_devices_rejected() {
        assert!(matches!(
            SwitchBotConfig::parse("{}"),
            Err(ConfigError::Validation(_))
        ));
        assert!(SwitchBotConfig::parse("{ known_only: false }").is_ok());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result =
            SwitchBotConfig::parse(r#"{ devices: [{ address: "C0:12:34:56:78:9A", type: "bot" }] }"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
