//! SwitchBot BLE advertisement instrumentation.
//!
//! A BLE scanner hands every received advertisement to the
//! [`EventSender`] returned by [`SwitchBotInstrumentation::sender`]
//! (see [`advertisement_event`]), either in process or through the UDP
//! [`relay`]. Meters report temperature, humidity and
//! CO2; Plug Minis report power. All devices report their RSSI.
//!
//! Devices that stop advertising disappear from the metrics once the
//! staleness threshold passes and are evicted from the store.

pub mod config;
pub mod decoder;
pub mod relay;

use tokio::sync::watch;
use tracing::info;

use sensorhub_framework::{
    ChannelSource, Component, DEFAULT_SIGNAL_FIELD, EventFilter, EventSender, MetricRegistry,
    ObservationStore, PushAdapter, Result, StalenessPolicy,
};

pub use config::{ConfigError, DeviceEntry, DeviceKind, SwitchBotConfig};
pub use decoder::{COMPANY_ID, SwitchBotDecoder, advertisement_event};
pub use relay::Advertisement;

/// Meter name used for SwitchBot instruments.
pub const METER_NAME: &str = "sensorhub.switchbot";

/// Configured SwitchBot instrumentation.
pub struct SwitchBotInstrumentation {
    adapter: PushAdapter<SwitchBotDecoder>,
    source: ChannelSource,
    listen: Option<String>,
}

impl SwitchBotInstrumentation {
    pub fn new(config: &SwitchBotConfig, registry: &MetricRegistry) -> Result<Self> {
        config.validate()?;

        let decoder = SwitchBotDecoder::new(config.host.clone(), &config.devices)?;
        let filter = EventFilter {
            min_signal: config.min_rssi,
            known: decoder.known().cloned().collect(),
            known_only: config.known_only,
        };
        let adapter = PushAdapter::new(
            "switchbot",
            ObservationStore::new(),
            decoder,
            filter,
            StalenessPolicy::from_millis(config.staleness_ms),
        );

        let meter = registry.meter(METER_NAME);
        let exporter = adapter.exporter();
        exporter.register(
            &meter,
            "sensor.rssi",
            "Received signal strength",
            Some("dBm"),
            vec![Component::field(DEFAULT_SIGNAL_FIELD)],
        );
        exporter.register(
            &meter,
            "sensor.temperature",
            "Temperature",
            Some("Cel"),
            vec![Component::field(decoder::TEMPERATURE)],
        );
        exporter.register(
            &meter,
            "sensor.humidity",
            "Relative humidity",
            Some("%"),
            vec![Component::field(decoder::HUMIDITY)],
        );
        exporter.register(
            &meter,
            "sensor.co2",
            "CO2 concentration",
            Some("ppm"),
            vec![Component::field(decoder::CO2)],
        );
        exporter.register(
            &meter,
            "sensor.power",
            "Power consumption",
            Some("W"),
            vec![Component::field(decoder::POWER)],
        );
        adapter.stats().register_events(&meter, "switchbot");

        info!(
            devices = config.devices.len(),
            known_only = config.known_only,
            "SwitchBot instrumentation enabled"
        );

        Ok(Self {
            adapter,
            source: ChannelSource::new(config.queue_size),
            listen: config.listen.clone(),
        })
    }

    /// Handle for the scanner to deliver advertisements.
    pub fn sender(&self) -> EventSender {
        self.source.sender()
    }

    pub fn adapter(&self) -> &PushAdapter<SwitchBotDecoder> {
        &self.adapter
    }

    /// Process advertisements until shutdown.
    ///
    /// Binds the UDP relay first when one is configured; a bind failure is
    /// returned before any advertisement is consumed.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let relay = match &self.listen {
            Some(addr) => {
                let socket = relay::bind(addr).await?;
                Some(tokio::spawn(relay::run(
                    socket,
                    self.source.sender(),
                    shutdown.clone(),
                )))
            }
            None => None,
        };

        let result = self.adapter.run(self.source, shutdown).await;
        if let Some(relay) = relay {
            relay::join(relay).await;
        }
        result
    }
}
