//! Per-adapter counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sensorhub_common::{Measurement, Tags};

use crate::poll::FetchOutcome;
use crate::push::EventOutcome;
use crate::registry::Meter;

/// Counters shared between an adapter and its metric callbacks.
#[derive(Debug, Default)]
pub struct AdapterStats {
    fetches_updated: AtomicU64,
    fetches_failed: AtomicU64,
    fetches_skipped: AtomicU64,
    events_accepted: AtomicU64,
    events_malformed: AtomicU64,
    events_discarded: AtomicU64,
    evicted: AtomicU64,
}

/// Plain copy of [`AdapterStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub fetches_updated: u64,
    pub fetches_failed: u64,
    pub fetches_skipped: u64,
    pub events_accepted: u64,
    pub events_malformed: u64,
    pub events_discarded: u64,
    pub evicted: u64,
}

impl AdapterStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_fetch(&self, outcome: FetchOutcome) {
        let counter = match outcome {
            FetchOutcome::Updated => &self.fetches_updated,
            FetchOutcome::Failed => &self.fetches_failed,
            FetchOutcome::Skipped => &self.fetches_skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self, outcome: EventOutcome) {
        let counter = match outcome {
            EventOutcome::Updated => &self.events_accepted,
            EventOutcome::Malformed => &self.events_malformed,
            EventOutcome::BelowThreshold | EventOutcome::Unknown | EventOutcome::Outdated => {
                &self.events_discarded
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evicted(&self, count: usize) {
        self.evicted.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fetches_updated: self.fetches_updated.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            fetches_skipped: self.fetches_skipped.load(Ordering::Relaxed),
            events_accepted: self.events_accepted.load(Ordering::Relaxed),
            events_malformed: self.events_malformed.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    /// Register `sensorhub.adapter.fetches{adapter,result}`.
    pub fn register_fetches(self: &Arc<Self>, meter: &Meter, adapter: &str) {
        let stats = Arc::clone(self);
        let adapter = adapter.to_string();
        meter
            .observable_counter("sensorhub.adapter.fetches")
            .with_description("Poll fetches by result")
            .with_callback(move || {
                let s = stats.snapshot();
                by_result(
                    &adapter,
                    &[
                        ("updated", s.fetches_updated),
                        ("failed", s.fetches_failed),
                        ("skipped", s.fetches_skipped),
                    ],
                )
            })
            .build();
    }

    /// Register `sensorhub.adapter.events{adapter,result}`.
    pub fn register_events(self: &Arc<Self>, meter: &Meter, adapter: &str) {
        let stats = Arc::clone(self);
        let adapter = adapter.to_string();
        meter
            .observable_counter("sensorhub.adapter.events")
            .with_description("Push events by result")
            .with_callback(move || {
                let s = stats.snapshot();
                by_result(
                    &adapter,
                    &[
                        ("accepted", s.events_accepted),
                        ("malformed", s.events_malformed),
                        ("discarded", s.events_discarded),
                        ("evicted", s.evicted),
                    ],
                )
            })
            .build();
    }
}

fn by_result(adapter: &str, counts: &[(&str, u64)]) -> Vec<Measurement> {
    counts
        .iter()
        .map(|(result, count)| {
            Measurement::new(
                *count as f64,
                Tags::new().with("adapter", adapter).with("result", *result),
            )
        })
        .collect()
}
