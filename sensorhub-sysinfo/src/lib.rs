//! Local hardware instrumentation.
//!
//! Targets are resolved once at startup: the CPU, memory, every selected
//! mount point and every selected network interface. A mount or interface
//! that later vanishes keeps its tags but reports nothing.
//!
//! Metrics:
//! - `hardware.cpu.load` (%)
//! - `hardware.memory.used`, `hardware.memory.available`, `hardware.memory.total` (bytes)
//! - `hardware.storage.space{kind="total"|"used"|"available"}` (bytes)
//! - `hardware.network.bytes{direction="rx"|"tx"}` (bytes since boot)

pub mod config;
pub mod source;

use tokio::sync::watch;
use tracing::info;

use sensorhub_framework::{
    Component, MetricRegistry, ObservationStore, PollAdapter, PollOptions, PollTarget, Result,
};

pub use config::{ConfigError, DiskConfig, NetworkConfig, SysinfoConfig};
pub use source::{HardwareSession, HardwareSource, NameFilter, discover};

use source::{
    LOAD, MEMORY_AVAILABLE, MEMORY_TOTAL, MEMORY_USED, RX, SPACE_AVAILABLE, SPACE_TOTAL,
    SPACE_USED, TX,
};

/// Meter name used for hardware instruments.
pub const METER_NAME: &str = "sensorhub.hardware";

/// Configured hardware instrumentation.
pub struct SysinfoInstrumentation {
    adapter: PollAdapter<HardwareSource>,
}

impl SysinfoInstrumentation {
    /// Discover local hardware and register metrics.
    pub fn new(config: &SysinfoConfig, registry: &MetricRegistry) -> Result<Self> {
        config.validate()?;
        let sources = discover(config)?;
        Self::with_sources(config, registry, sources)
    }

    /// Build from an explicit target list.
    pub fn with_sources(
        config: &SysinfoConfig,
        registry: &MetricRegistry,
        sources: Vec<HardwareSource>,
    ) -> Result<Self> {
        let targets = sources
            .into_iter()
            .map(|source| {
                Ok(PollTarget::new(
                    source.id()?,
                    source.tags(config.host.as_deref()),
                    source,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let adapter = PollAdapter::new(
            "sysinfo",
            ObservationStore::new(),
            targets,
            PollOptions::from_millis(config.interval_ms, config.timeout_ms)?,
        )?;

        let meter = registry.meter(METER_NAME);
        let exporter = adapter.exporter();
        exporter.register(
            &meter,
            "hardware.cpu.load",
            "Total CPU load",
            Some("%"),
            vec![Component::field(LOAD)],
        );
        for (name, field, description) in [
            ("hardware.memory.used", MEMORY_USED, "Used memory"),
            ("hardware.memory.available", MEMORY_AVAILABLE, "Available memory"),
            ("hardware.memory.total", MEMORY_TOTAL, "Total memory"),
        ] {
            exporter.register(&meter, name, description, Some("By"), vec![Component::field(field)]);
        }
        exporter.register(
            &meter,
            "hardware.storage.space",
            "Storage space",
            Some("By"),
            vec![
                Component::field(SPACE_TOTAL).with_tag("kind", "total"),
                Component::field(SPACE_USED).with_tag("kind", "used"),
                Component::field(SPACE_AVAILABLE).with_tag("kind", "available"),
            ],
        );
        exporter.register(
            &meter,
            "hardware.network.bytes",
            "Network traffic since boot",
            Some("By"),
            vec![
                Component::field(RX).with_tag("direction", "rx"),
                Component::field(TX).with_tag("direction", "tx"),
            ],
        );
        adapter.stats().register_fetches(&meter, "sysinfo");

        info!(targets = adapter.target_count(), "Hardware instrumentation enabled");
        Ok(Self { adapter })
    }

    pub fn adapter(&self) -> &PollAdapter<HardwareSource> {
        &self.adapter
    }

    /// Poll until shutdown.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        self.adapter.run(shutdown).await;
    }
}
