//! Prometheus exposition for SensorHub metrics.
//!
//! Serves the contents of a [`MetricRegistry`](sensorhub_framework::MetricRegistry)
//! over HTTP in the Prometheus text format. Every scrape invokes the
//! registered callbacks, so values are read from the observation stores at
//! request time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   Instruments   │────>│    Renderer     │────>│   HTTP Server   │
//! │   (registry)    │     │ (text format)   │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```

pub mod config;
pub mod http;
pub mod mapping;
pub mod render;

pub use config::{ConfigError, FilterConfig, PrometheusConfig};
pub use http::{HttpServer, create_router};
pub use render::{MetricFilter, Renderer};
