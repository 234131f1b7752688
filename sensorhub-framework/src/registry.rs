//! Metric registry: the sink contract between instrumentations and exporters.
//!
//! Instrumentations get a [`Meter`] from a shared [`MetricRegistry`] and
//! register observable instruments on it. Each instrument carries a callback
//! that is invoked on demand (scrape or export tick) and returns the current
//! `(value, tags)` pairs.
//!
//! ```ignore
//! let registry = MetricRegistry::new();
//! let meter = registry.meter("sensorhub.switchbot");
//! meter
//!     .observable_gauge("sensor.temperature")
//!     .with_description("Temperature")
//!     .with_unit("Cel")
//!     .with_callback(move || exporter.measure(&components, Instant::now()))
//!     .build();
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;

use sensorhub_common::Measurement;

/// Zero-argument measurement callback.
pub type Callback = Arc<dyn Fn() -> Vec<Measurement> + Send + Sync>;

/// Instrument kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Point-in-time value.
    Gauge,
    /// Monotonically increasing total.
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

/// Static description of an instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDescriptor {
    /// Meter (instrumentation scope) that owns the instrument.
    pub meter: String,
    /// Dotted metric name, e.g. `sensor.temperature`.
    pub name: String,
    pub description: String,
    pub unit: Option<String>,
    pub kind: MetricKind,
}

/// A registered instrument.
#[derive(Clone)]
pub struct Instrument {
    descriptor: MetricDescriptor,
    callback: Callback,
}

impl Instrument {
    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    /// Invoke the callback.
    ///
    /// A panicking callback yields no measurements instead of taking the
    /// caller down with it.
    pub fn observe(&self) -> Vec<Measurement> {
        match catch_unwind(AssertUnwindSafe(|| (self.callback)())) {
            Ok(measurements) => measurements,
            Err(_) => {
                tracing::error!(metric = %self.descriptor.name, "Metric callback panicked");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Result of collecting one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub descriptor: MetricDescriptor,
    pub measurements: Vec<Measurement>,
}

/// Shared handle to the set of registered instruments.
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    instruments: Arc<RwLock<Vec<Instrument>>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a meter that registers instruments under `name`.
    pub fn meter(&self, name: impl Into<String>) -> Meter {
        Meter {
            name: name.into(),
            registry: self.clone(),
        }
    }

    fn register(&self, instrument: Instrument) {
        tracing::debug!(
            meter = %instrument.descriptor.meter,
            metric = %instrument.descriptor.name,
            kind = instrument.descriptor.kind.as_str(),
            "Registered instrument"
        );
        self.instruments.write().push(instrument);
    }

    /// Registered instruments, in registration order.
    pub fn instruments(&self) -> Vec<Instrument> {
        self.instruments.read().clone()
    }

    /// Invoke every callback and return the results.
    ///
    /// Callbacks run outside the registry lock, so a callback may itself
    /// register instruments without deadlocking.
    pub fn collect(&self) -> Vec<MetricFamily> {
        self.instruments()
            .into_iter()
            .map(|instrument| MetricFamily {
                measurements: instrument.observe(),
                descriptor: instrument.descriptor,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instruments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.read().is_empty()
    }
}

/// Named instrumentation scope.
#[derive(Debug, Clone)]
pub struct Meter {
    name: String,
    registry: MetricRegistry,
}

impl Meter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn observable_gauge(&self, name: impl Into<String>) -> InstrumentBuilder<'_> {
        self.builder(name.into(), MetricKind::Gauge)
    }

    pub fn observable_counter(&self, name: impl Into<String>) -> InstrumentBuilder<'_> {
        self.builder(name.into(), MetricKind::Counter)
    }

    fn builder(&self, name: String, kind: MetricKind) -> InstrumentBuilder<'_> {
        InstrumentBuilder {
            meter: self,
            name,
            description: String::new(),
            unit: None,
            kind,
            callback: None,
        }
    }
}

/// Builder returned by [`Meter::observable_gauge`] and
/// [`Meter::observable_counter`].
pub struct InstrumentBuilder<'a> {
    meter: &'a Meter,
    name: String,
    description: String,
    unit: Option<String>,
    kind: MetricKind,
    callback: Option<Callback>,
}

impl InstrumentBuilder<'_> {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> Vec<Measurement> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Register the instrument. Without a callback it reports nothing.
    pub fn build(self) {
        let callback: Callback = match self.callback {
            Some(callback) => callback,
            None => Arc::new(Vec::<Measurement>::new),
        };
        self.meter.registry.register(Instrument {
            descriptor: MetricDescriptor {
                meter: self.meter.name.clone(),
                name: self.name,
                description: self.description,
                unit: self.unit,
                kind: self.kind,
            },
            callback,
        });
    }
}
