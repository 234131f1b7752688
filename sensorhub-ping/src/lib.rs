//! Latency probe instrumentation.
//!
//! Reports `ping.result.time` (milliseconds) for each configured target.
//! A target that stops answering keeps its identity in the store but
//! reports no value until it answers again.

pub mod config;
pub mod probe;

use tokio::sync::watch;
use tracing::info;

use sensorhub_framework::{
    Component, EntityId, MetricRegistry, ObservationStore, PollAdapter, PollOptions, PollTarget,
    Result, Tags,
};

pub use config::{ConfigError, PingConfig, PingTarget};
pub use probe::{TIME_FIELD, TcpProbe};

/// Meter name used for ping instruments.
pub const METER_NAME: &str = "sensorhub.ping";

/// Configured ping instrumentation.
pub struct PingInstrumentation {
    adapter: PollAdapter<TcpProbe>,
}

impl PingInstrumentation {
    /// Build targets from `config` and register metrics on `registry`.
    pub fn new(config: &PingConfig, registry: &MetricRegistry) -> Result<Self> {
        config.validate()?;

        let targets = config
            .targets
            .iter()
            .map(|target| {
                let mut tags = Tags::new();
                if let Some(host) = &config.host {
                    tags.insert("host", host.clone());
                }
                tags.insert("address", target.address.clone());
                tags.insert("name", target.display_name().to_string());
                Ok(PollTarget::new(
                    EntityId::address(target.address.clone())?,
                    tags,
                    TcpProbe::new(target.address.clone(), target.port),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let adapter = PollAdapter::new(
            "ping",
            ObservationStore::new(),
            targets,
            PollOptions::from_millis(config.interval_ms, config.timeout_ms)?,
        )?;

        let meter = registry.meter(METER_NAME);
        adapter.exporter().register(
            &meter,
            "ping.result.time",
            "Round-trip time to the target",
            Some("ms"),
            vec![Component::field(TIME_FIELD)],
        );
        adapter.stats().register_fetches(&meter, "ping");

        info!(targets = adapter.target_count(), "Ping instrumentation enabled");
        Ok(Self { adapter })
    }

    pub fn adapter(&self) -> &PollAdapter<TcpProbe> {
        &self.adapter
    }

    /// Probe until shutdown.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        self.adapter.run(shutdown).await;
    }
}
