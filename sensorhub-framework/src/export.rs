//! Metric snapshot exporter.
//!
//! Turns the current contents of an [`ObservationStore`] into measurements,
//! filtered by a [`StalenessPolicy`]. Holds only read-only handles, so any
//! number of scrapes can run at once.

use tokio::time::Instant;

use sensorhub_common::{Measurement, TagValue};

use crate::registry::Meter;
use crate::staleness::StalenessPolicy;
use crate::store::ObservationStore;

/// One field reported under a metric, with an optional extra tag.
///
/// A metric with sub-components (e.g. received/transmitted bytes) lists one
/// `Component` per field, each with its own discriminator tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    field: String,
    discriminator: Option<(String, TagValue)>,
}

impl Component {
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            discriminator: None,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.discriminator = Some((key.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.field
    }
}

/// Reads the store at scrape time.
#[derive(Debug, Clone)]
pub struct SnapshotExporter {
    store: ObservationStore,
    policy: StalenessPolicy,
}

impl SnapshotExporter {
    pub fn new(store: ObservationStore, policy: StalenessPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> StalenessPolicy {
        self.policy
    }

    /// Measurements for `components` across every fresh observation.
    ///
    /// Missing fields and stale observations are skipped. An empty store
    /// yields an empty vector.
    pub fn measure(&self, components: &[Component], now: Instant) -> Vec<Measurement> {
        let mut out = Vec::new();
        for observation in self.store.snapshot() {
            if self.policy.is_stale(&observation, now) {
                continue;
            }
            for component in components {
                let Some(value) = observation.field(&component.field) else {
                    continue;
                };
                let mut tags = observation.tags().clone();
                if let Some((key, tag)) = &component.discriminator {
                    tags.insert(key.clone(), tag.clone());
                }
                out.push(Measurement::new(value, tags));
            }
        }
        out
    }

    /// Measurements of a single field without discriminator.
    pub fn measure_field(&self, field: &str, now: Instant) -> Vec<Measurement> {
        self.measure(&[Component::field(field)], now)
    }

    /// Register an observable gauge that reports `components` on every scrape.
    pub fn register(
        &self,
        meter: &Meter,
        name: &str,
        description: &str,
        unit: Option<&str>,
        components: Vec<Component>,
    ) {
        let exporter = self.clone();
        let mut builder = meter
            .observable_gauge(name)
            .with_description(description)
            .with_callback(move || exporter.measure(&components, Instant::now()));
        if let Some(unit) = unit {
            builder = builder.with_unit(unit);
        }
        builder.build();
    }
}
