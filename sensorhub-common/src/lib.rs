//! Types shared by every SensorHub crate.
//!
//! - [`telemetry`]: entity ids, fields, tags and measurements
//! - [`logging`]: the `logging` config section and [`init_tracing`]

pub mod error;
pub mod logging;
pub mod telemetry;

pub use error::{Error, Result};
pub use logging::{LogFormat, LoggingConfig, init_tracing};
pub use telemetry::{EntityId, Fields, MacAddress, Measurement, TagValue, Tags};
