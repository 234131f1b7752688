//! SensorHub Framework
//!
//! The ingestion and export engine shared by every SensorHub instrumentation.
//!
//! # Overview
//!
//! This framework provides:
//! - [`ObservationStore`]: last known reading per entity, safe under
//!   concurrent ingestion and scrapes
//! - [`StalenessPolicy`]: decides whether an observation is still reportable
//! - [`PushAdapter`]: event-driven ingestion (radio advertisements)
//! - [`PollAdapter`]: periodic per-target fetches with overlap protection
//! - [`SnapshotExporter`]: turns the store into measurements at scrape time
//! - [`MetricRegistry`]: the sink that exporters collect from
//! - [`ServiceRunner`], [`ServiceConfig`], [`ServiceArgs`]: service lifecycle
//!
//! # Example
//!
//! ```ignore
//! use sensorhub_framework::{
//!     Component, ObservationStore, PollAdapter, PollOptions, PollTarget, ServiceRunner,
//! };
//!
//! let store = ObservationStore::new();
//! let adapter = PollAdapter::new("omron", store, targets, PollOptions::from_millis(1000, 2000)?)?;
//! adapter.exporter().register(
//!     &runner.registry().meter("sensorhub.omron"),
//!     "sensor.temperature",
//!     "Temperature",
//!     Some("Cel"),
//!     vec![Component::field("temperature")],
//! );
//!
//! let shutdown = runner.shutdown_signal();
//! runner.spawn("omron", async move { adapter.run(shutdown).await });
//! runner.run().await
//! ```

mod args;
mod config;
mod error;
mod export;
mod poll;
mod push;
mod registry;
mod runner;
mod staleness;
mod stats;
mod store;

pub use args::ServiceArgs;
pub use config::{ServiceConfig, positive_millis};
pub use error::{AdapterError, FetchError, Result};
pub use export::{Component, SnapshotExporter};
pub use poll::{FetchOutcome, PollAdapter, PollOptions, PollSource, PollTarget, TickReport};
pub use push::{
    ChannelSource, DEFAULT_SIGNAL_FIELD, Event, EventDecoder, EventFilter, EventOutcome,
    EventSender, EventSource, PushAdapter,
};
pub use registry::{
    Callback, Instrument, InstrumentBuilder, Meter, MetricDescriptor, MetricFamily, MetricKind,
    MetricRegistry,
};
pub use runner::{DEFAULT_SHUTDOWN_GRACE, ServiceRunner, shutdown_requested};
pub use staleness::{StalenessPolicy, is_stale};
pub use stats::{AdapterStats, StatsSnapshot};
pub use store::{Observation, ObservationStore};

// Re-export commonly used types from sensorhub-common
pub use sensorhub_common::{
    EntityId, Fields, LogFormat, LoggingConfig, MacAddress, Measurement, TagValue, Tags,
};
