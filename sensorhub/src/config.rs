//! Service configuration.

use serde::Deserialize;

use sensorhub_exporter_otel::OtelConfig;
use sensorhub_exporter_prometheus::PrometheusConfig;
use sensorhub_framework::{AdapterError, LoggingConfig, Result, ServiceConfig};
use sensorhub_omron::OmronConfig;
use sensorhub_ping::PingConfig;
use sensorhub_switchbot::SwitchBotConfig;
use sensorhub_sysinfo::SysinfoConfig;

/// Top-level configuration file.
///
/// Every instrumentation section is optional; a missing section disables
/// that instrumentation.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorHubConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Default `host` tag for every instrumentation. `"auto"` uses the
    /// machine hostname.
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// OTLP push, disabled when absent.
    #[serde(default)]
    pub otlp: Option<OtelConfig>,

    #[serde(default)]
    pub switchbot: Option<SwitchBotConfig>,

    #[serde(default)]
    pub omron: Option<OmronConfig>,

    #[serde(default)]
    pub ping: Option<PingConfig>,

    #[serde(default)]
    pub sysinfo: Option<SysinfoConfig>,
}

impl SensorHubConfig {
    /// The service-wide host tag, with `"auto"` resolved.
    pub fn resolved_host(&self) -> Option<String> {
        match self.host.as_deref() {
            Some("auto") => Some(
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
            other => other.map(str::to_string),
        }
    }

    /// Fill in the `host` of every instrumentation that does not set its own.
    pub fn apply_host(&mut self) {
        let Some(host) = self.resolved_host() else {
            return;
        };
        let fill = |slot: &mut Option<String>| {
            if slot.is_none() {
                *slot = Some(host.clone());
            }
        };
        if let Some(c) = &mut self.switchbot {
            fill(&mut c.host);
        }
        if let Some(c) = &mut self.omron {
            fill(&mut c.host);
        }
        if let Some(c) = &mut self.ping {
            fill(&mut c.host);
        }
        if let Some(c) = &mut self.sysinfo {
            fill(&mut c.host);
        }
    }

    /// Names of the configured instrumentations.
    pub fn enabled(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.switchbot.is_some() {
            names.push("switchbot");
        }
        if self.omron.is_some() {
            names.push("omron");
        }
        if self.ping.is_some() {
            names.push("ping");
        }
        if self.sysinfo.is_some() {
            names.push("sysinfo");
        }
        names
    }
}

impl ServiceConfig for SensorHubConfig {
    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<()> {
        if self.enabled().is_empty() {
            return Err(AdapterError::validation(
                "At least one instrumentation must be configured",
            ));
        }
        self.prometheus
            .validate()
            .map_err(|e| AdapterError::validation(format!("prometheus: {}", e)))?;
        if let Some(otlp) = &self.otlp {
            otlp.validate()
                .map_err(|e| AdapterError::validation(format!("otlp: {}", e)))?;
        }
        if let Some(c) = &self.switchbot {
            c.validate()?;
        }
        if let Some(c) = &self.omron {
            c.validate()?;
        }
        if let Some(c) = &self.ping {
            c.validate()?;
        }
        if let Some(c) = &self.sysinfo {
            c.validate()?;
        }
        Ok(())
    }
}
