//! OTLP export for SensorHub metrics.
//!
//! Pushes the contents of a [`MetricRegistry`](sensorhub_framework::MetricRegistry)
//! to an OpenTelemetry collector over gRPC or HTTP. This runs alongside the
//! Prometheus endpoint; both read the same instruments.
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   Instruments   │────>│   OTel Bridge   │────>│  OTLP Endpoint  │
//! │   (registry)    │     │ (periodic read) │     │  (Collector)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```

pub mod config;
pub mod exporter;

pub use config::{ConfigError, OtelConfig, OtlpProtocol};
pub use exporter::{OtelBridge, build_attributes, build_resource_attributes};
