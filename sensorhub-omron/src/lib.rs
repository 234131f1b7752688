//! Omron 2JCIE-BU USB environment sensor instrumentation.
//!
//! Each configured serial port is a poll target. Readings are exported as
//! `sensor.<field>` gauges tagged with `model="omron"`, the port and the
//! device name. A sensor that stops answering keeps its tags but reports no
//! values until a read succeeds again.

pub mod config;
pub mod frame;
pub mod sensor;

use tokio::sync::watch;
use tracing::info;

use sensorhub_framework::{
    Component, EntityId, MetricRegistry, ObservationStore, PollAdapter, PollOptions, PollSource,
    PollTarget, Result, Tags,
};

pub use config::{ConfigError, MetricToggles, OmronConfig, OmronDevice};
pub use sensor::SerialSensor;

/// Meter name used for Omron instruments.
pub const METER_NAME: &str = "sensorhub.omron";

fn describe(field: &str) -> (&'static str, &'static str) {
    match field {
        frame::TEMPERATURE => ("Temperature", "Cel"),
        frame::HUMIDITY => ("Relative humidity", "%"),
        frame::LIGHT => ("Ambient light", "lx"),
        frame::PRESSURE => ("Barometric pressure", "hPa"),
        frame::NOISE => ("Sound noise", "dB"),
        frame::DISCOMFORT => ("Discomfort index", "1"),
        frame::HEAT => ("Heat stroke risk", "Cel"),
        frame::ETVOC => ("Equivalent total VOC", "ppb"),
        frame::ECO2 => ("Equivalent CO2", "ppm"),
        frame::SEISMIC => ("Seismic intensity", "1"),
        _ => ("", "1"),
    }
}

/// Configured Omron instrumentation.
pub struct OmronInstrumentation<S: PollSource = SerialSensor> {
    adapter: PollAdapter<S>,
}

impl OmronInstrumentation<SerialSensor> {
    /// Open every configured serial port lazily and register metrics.
    pub fn new(config: &OmronConfig, registry: &MetricRegistry) -> Result<Self> {
        Self::with_sources(config, registry, |device| {
            SerialSensor::new(device.port.clone()).with_baud_rate(device.baud_rate)
        })
    }
}

impl<S: PollSource> OmronInstrumentation<S> {
    /// Build with a custom source per device.
    pub fn with_sources<F>(config: &OmronConfig, registry: &MetricRegistry, source: F) -> Result<Self>
    where
        F: Fn(&OmronDevice) -> S,
    {
        config.validate()?;

        let targets = config
            .devices
            .iter()
            .map(|device| {
                let mut tags = Tags::new().with("model", "omron");
                if let Some(host) = &config.host {
                    tags.insert("host", host.clone());
                }
                tags.insert("port", device.port.clone());
                tags.insert("name", device.display_name().to_string());
                Ok(PollTarget::new(
                    EntityId::port(device.port.clone())?,
                    tags,
                    source(device),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let adapter = PollAdapter::new(
            "omron",
            ObservationStore::new(),
            targets,
            PollOptions::from_millis(config.interval_ms, config.timeout_ms)?,
        )?;

        let meter = registry.meter(METER_NAME);
        let exporter = adapter.exporter();
        for field in config.metrics.enabled() {
            let (description, unit) = describe(field);
            exporter.register(
                &meter,
                &format!("sensor.{}", field),
                description,
                Some(unit),
                vec![Component::field(field)],
            );
        }
        adapter.stats().register_fetches(&meter, "omron");

        info!(
            devices = adapter.target_count(),
            metrics = config.metrics.enabled().len(),
            "Omron instrumentation enabled"
        );
        Ok(Self { adapter })
    }

    pub fn adapter(&self) -> &PollAdapter<S> {
        &self.adapter
    }

    /// Poll until shutdown.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        self.adapter.run(shutdown).await;
    }
}
