//! Event-driven ingestion for push sources (radio advertisements).
//!
//! A [`PushAdapter`] consumes [`Event`]s from an [`EventSource`], filters
//! them, decodes the payload with an [`EventDecoder`] and merges the result
//! into the store. Entities are discovered as they appear and evicted once
//! they stop reporting for longer than the staleness threshold.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use sensorhub_common::{EntityId, Fields, Tags};

use crate::error::{AdapterError, Result};
use crate::export::SnapshotExporter;
use crate::staleness::StalenessPolicy;
use crate::stats::AdapterStats;
use crate::store::ObservationStore;

/// Field name used for the signal strength when none is configured.
pub const DEFAULT_SIGNAL_FIELD: &str = "rssi";

/// One unsolicited reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub source: EntityId,
    /// Signal strength or quality, if the transport reports one.
    pub signal: Option<f64>,
    pub payload: Vec<u8>,
}

/// Protocol-specific payload decoding.
pub trait EventDecoder: Send + Sync + 'static {
    /// Static tags for a newly discovered entity.
    fn tags(&self, id: &EntityId) -> Tags;

    /// Decode `payload`. `None` means short or malformed.
    fn decode(&self, id: &EntityId, payload: &[u8]) -> Option<Fields>;

    /// Whether a decoded payload for `id` is the complete field set.
    ///
    /// When true, fields missing from the payload are dropped instead of
    /// kept from earlier events. The signal field is always kept.
    fn replaces(&self, _id: &EntityId) -> bool {
        false
    }
}

/// Admission rules applied to every event.
///
/// The signal threshold is checked first, then the allow-list. Events
/// without a signal value pass the threshold.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub min_signal: Option<f64>,
    pub known: HashSet<EntityId>,
    pub known_only: bool,
}

impl EventFilter {
    fn check(&self, event: &Event) -> Option<EventOutcome> {
        if let (Some(min), Some(signal)) = (self.min_signal, event.signal) {
            if signal < min {
                return Some(EventOutcome::BelowThreshold);
            }
        }
        if self.known_only && !self.known.contains(&event.source) {
            return Some(EventOutcome::Unknown);
        }
        None
    }
}

/// What [`PushAdapter::handle`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Fields decoded and merged.
    Updated,
    /// Payload rejected; timestamp and signal refreshed, fields kept.
    Malformed,
    /// Dropped: signal below threshold.
    BelowThreshold,
    /// Dropped: not in the allow-list.
    Unknown,
    /// Dropped: older than the stored observation.
    Outdated,
}

/// A stream of events that can be started and stopped.
pub trait EventSource: Send + 'static {
    /// Start delivery.
    fn subscribe(&mut self) -> Result<mpsc::Receiver<Event>>;

    /// Stop delivery. Events emitted afterwards may be dropped.
    fn unsubscribe(&mut self);
}

/// In-process [`EventSource`] fed through an [`EventSender`].
pub struct ChannelSource {
    sender: mpsc::Sender<Event>,
    receiver: Option<mpsc::Receiver<Event>>,
    active: Arc<AtomicBool>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Some(receiver),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
            active: self.active.clone(),
        }
    }
}

impl EventSource for ChannelSource {
    fn subscribe(&mut self) -> Result<mpsc::Receiver<Event>> {
        let receiver = self
            .receiver
            .take()
            .ok_or_else(|| AdapterError::worker("event source already subscribed"))?;
        self.active.store(true, Ordering::SeqCst);
        Ok(receiver)
    }

    fn unsubscribe(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Producer side of a [`ChannelSource`]; cheap to clone.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
    active: Arc<AtomicBool>,
}

impl EventSender {
    /// Deliver an event without waiting.
    ///
    /// Returns `false` when the event was dropped: source not subscribed,
    /// receiver gone, or queue full.
    pub fn publish(&self, event: Event) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::debug!(source = %event.source, "Event queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Push ingestion adapter.
pub struct PushAdapter<D: EventDecoder> {
    name: String,
    store: ObservationStore,
    decoder: D,
    filter: EventFilter,
    policy: StalenessPolicy,
    signal_field: String,
    stats: Arc<AdapterStats>,
}

impl<D: EventDecoder> PushAdapter<D> {
    pub fn new(
        name: impl Into<String>,
        store: ObservationStore,
        decoder: D,
        filter: EventFilter,
        policy: StalenessPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            decoder,
            filter,
            policy,
            signal_field: DEFAULT_SIGNAL_FIELD.to_string(),
            stats: AdapterStats::new(),
        }
    }

    /// Store the signal strength under `field` instead of `rssi`.
    pub fn with_signal_field(mut self, field: impl Into<String>) -> Self {
        self.signal_field = field.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &ObservationStore {
        &self.store
    }

    pub fn stats(&self) -> Arc<AdapterStats> {
        self.stats.clone()
    }

    /// Exporter over this adapter's store, filtered by its staleness policy.
    pub fn exporter(&self) -> SnapshotExporter {
        SnapshotExporter::new(self.store.clone(), self.policy)
    }

    /// Process one event received at `now`.
    pub fn handle(&self, event: Event, now: Instant) -> EventOutcome {
        let outcome = self.apply(event, now);
        self.stats.record_event(outcome);
        outcome
    }

    fn apply(&self, event: Event, now: Instant) -> EventOutcome {
        if let Some(rejected) = self.filter.check(&event) {
            tracing::trace!(adapter = %self.name, source = %event.source, outcome = ?rejected, "Event discarded");
            return rejected;
        }

        let id = event.source;
        let decoded = self.decoder.decode(&id, &event.payload);
        let mut outcome = if decoded.is_some() {
            EventOutcome::Updated
        } else {
            EventOutcome::Malformed
        };

        self.store.upsert(
            &id,
            || self.decoder.tags(&id),
            |obs| {
                if !obs.accepts(now) {
                    outcome = EventOutcome::Outdated;
                    return obs;
                }
                let signal_field = self.signal_field.as_str();
                let mut obs = match decoded {
                    Some(fields) if self.decoder.replaces(&id) => {
                        let previous = obs.field(signal_field);
                        let obs = obs.record(now, fields);
                        match previous {
                            Some(signal) => obs.set(signal_field, signal),
                            None => obs,
                        }
                    }
                    Some(fields) => obs.merge(now, fields),
                    None => obs.touch(now),
                };
                if let Some(signal) = event.signal {
                    obs = obs.set(signal_field, signal);
                }
                obs
            },
        );

        if outcome == EventOutcome::Malformed {
            tracing::debug!(
                adapter = %self.name,
                source = %id,
                len = event.payload.len(),
                "Payload not decoded, keeping previous fields"
            );
        }
        outcome
    }

    /// Drop every observation the staleness policy no longer reports.
    pub fn evict_stale(&self, now: Instant) -> usize {
        if !self.policy.is_enabled() {
            return 0;
        }
        let evicted = self.store.evict_where(|obs| self.policy.is_stale(obs, now));
        if evicted > 0 {
            self.stats.record_evicted(evicted);
            tracing::debug!(adapter = %self.name, evicted, "Evicted stale entities");
        }
        evicted
    }

    /// Consume events until shutdown or until the source closes.
    ///
    /// Stale entities are evicted once per staleness period. The source is
    /// unsubscribed before returning.
    pub async fn run<S: EventSource>(
        &self,
        mut source: S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut events = source.subscribe()?;
        let mut eviction = self.policy.max_age().map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        tracing::info!(
            adapter = %self.name,
            known = self.filter.known.len(),
            known_only = self.filter.known_only,
            "Push adapter started"
        );

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => match event {
                        Some(event) => {
                            self.handle(event, Instant::now());
                        }
                        None => {
                            tracing::warn!(adapter = %self.name, "Event source closed");
                            break;
                        }
                    },
                    _ = next_tick(&mut eviction) => {
                        self.evict_stale(Instant::now());
                    }
                }
            }
        }

        source.unsubscribe();
        tracing::info!(adapter = %self.name, "Push adapter stopped");
        Ok(())
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
