//! SensorHub service.
//!
//! Loads one JSON5 configuration, builds the enabled instrumentations
//! against a shared [`MetricRegistry`](sensorhub_framework::MetricRegistry)
//! and exposes it over HTTP (and optionally OTLP).

pub mod application;
pub mod config;
pub mod service;

pub use config::SensorHubConfig;
pub use service::Instrumentations;
