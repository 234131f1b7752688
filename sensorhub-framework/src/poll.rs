//! Poll-driven ingestion for pull sources (serial sensors, network targets).
//!
//! A [`PollAdapter`] owns a fixed list of targets. On every tick it starts one
//! fetch task per idle target; a target whose previous fetch is still running
//! is skipped for that tick. Each target keeps its own session, opened lazily
//! and dropped whenever a fetch fails so the next tick reconnects.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use sensorhub_common::{EntityId, Fields, Tags};

use crate::config::positive_millis;
use crate::error::{AdapterError, FetchError, Result};
use crate::export::SnapshotExporter;
use crate::staleness::StalenessPolicy;
use crate::stats::AdapterStats;
use crate::store::ObservationStore;

/// A device or service that can be read on demand.
///
/// `Session` is the transport handle (serial stream, socket, library
/// object). Dropping it closes it.
pub trait PollSource: Send + Sync + 'static {
    type Session: Send + 'static;

    /// Open a new session.
    fn connect(&self) -> impl Future<Output = std::result::Result<Self::Session, FetchError>> + Send;

    /// Read the current values through an open session.
    ///
    /// The fetch timeout can only cancel this future at an `.await`, so
    /// implementations must not block the thread. Blocking device or OS
    /// calls go through `tokio::task::spawn_blocking`.
    fn read(
        &self,
        session: &mut Self::Session,
    ) -> impl Future<Output = std::result::Result<Fields, FetchError>> + Send;
}

/// A configured target.
pub struct PollTarget<S> {
    pub id: EntityId,
    pub tags: Tags,
    pub source: S,
}

impl<S> PollTarget<S> {
    pub fn new(id: EntityId, tags: Tags, source: S) -> Self {
        Self { id, tags, source }
    }
}

/// Timer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollOptions {
    /// Both durations must be non-zero.
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(AdapterError::validation("poll interval must be > 0"));
        }
        if timeout.is_zero() {
            return Err(AdapterError::validation("fetch timeout must be > 0"));
        }
        Ok(Self { interval, timeout })
    }

    pub fn from_millis(interval_ms: u64, timeout_ms: u64) -> Result<Self> {
        Self::new(
            positive_millis("interval_ms", interval_ms)?,
            positive_millis("timeout_ms", timeout_ms)?,
        )
    }
}

/// Result of one target fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Updated,
    Failed,
    Skipped,
}

/// What one tick dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub started: usize,
    pub skipped: usize,
}

struct Slot<S: PollSource> {
    id: EntityId,
    tags: Tags,
    source: Arc<S>,
    session: Arc<Mutex<Option<S::Session>>>,
}

/// Everything a fetch task needs, detached from the adapter.
struct FetchContext<S: PollSource> {
    adapter: Arc<str>,
    id: EntityId,
    tags: Tags,
    source: Arc<S>,
    store: ObservationStore,
    timeout: Duration,
}

/// Poll ingestion adapter.
pub struct PollAdapter<S: PollSource> {
    name: Arc<str>,
    store: ObservationStore,
    slots: Vec<Slot<S>>,
    options: PollOptions,
    stats: Arc<AdapterStats>,
}

impl<S: PollSource> PollAdapter<S> {
    /// Build the adapter and register every target in `store`.
    ///
    /// Fails on an empty target list or a duplicate id.
    pub fn new(
        name: impl Into<String>,
        store: ObservationStore,
        targets: Vec<PollTarget<S>>,
        options: PollOptions,
    ) -> Result<Self> {
        let name: String = name.into();
        if targets.is_empty() {
            return Err(AdapterError::validation(format!(
                "{}: at least one target required",
                name
            )));
        }

        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(&target.id) {
                return Err(AdapterError::validation(format!(
                    "{}: duplicate target '{}'",
                    name, target.id
                )));
            }
        }

        let slots = targets
            .into_iter()
            .map(|target| {
                store.register(target.id.clone(), target.tags.clone());
                Slot {
                    id: target.id,
                    tags: target.tags,
                    source: Arc::new(target.source),
                    session: Arc::new(Mutex::new(None)),
                }
            })
            .collect();

        Ok(Self {
            name: name.into(),
            store,
            slots,
            options,
            stats: AdapterStats::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &ObservationStore {
        &self.store
    }

    pub fn options(&self) -> PollOptions {
        self.options
    }

    pub fn stats(&self) -> Arc<AdapterStats> {
        self.stats.clone()
    }

    pub fn target_count(&self) -> usize {
        self.slots.len()
    }

    /// Exporter over this adapter's store.
    ///
    /// Failed targets already have empty fields, so no age filter is applied.
    pub fn exporter(&self) -> SnapshotExporter {
        SnapshotExporter::new(self.store.clone(), StalenessPolicy::disabled())
    }

    /// Start a fetch for every idle target. Never waits on I/O.
    pub fn tick(&self, tasks: &mut JoinSet<FetchOutcome>) -> TickReport {
        let mut report = TickReport::default();

        for slot in &self.slots {
            match slot.session.clone().try_lock_owned() {
                Ok(guard) => {
                    report.started += 1;
                    let ctx = FetchContext {
                        adapter: self.name.clone(),
                        id: slot.id.clone(),
                        tags: slot.tags.clone(),
                        source: slot.source.clone(),
                        store: self.store.clone(),
                        timeout: self.options.timeout,
                    };
                    tasks.spawn(isolated(ctx, guard, self.stats.clone()));
                }
                Err(_) => {
                    report.skipped += 1;
                    self.stats.record_fetch(FetchOutcome::Skipped);
                    tracing::debug!(
                        adapter = %self.name,
                        target = %slot.id,
                        "Previous fetch still running, skipping"
                    );
                }
            }
        }

        report
    }

    /// Poll on the configured interval until `shutdown` fires.
    ///
    /// The first tick is immediate. On shutdown the timer stops, in-flight
    /// fetches are awaited, then every session is closed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tasks = JoinSet::new();

        tracing::info!(
            adapter = %self.name,
            targets = self.slots.len(),
            interval_ms = self.options.interval.as_millis() as u64,
            timeout_ms = self.options.timeout.as_millis() as u64,
            "Poll adapter started"
        );

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let report = self.tick(&mut tasks);
                        tracing::trace!(
                            adapter = %self.name,
                            started = report.started,
                            skipped = report.skipped,
                            "Tick"
                        );
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        if let Err(e) = joined {
                            tracing::error!(adapter = %self.name, error = %e, "Fetch task aborted");
                        }
                    }
                }
            }
        }

        let pending = tasks.len();
        if pending > 0 {
            tracing::debug!(adapter = %self.name, pending, "Waiting for in-flight fetches");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(adapter = %self.name, error = %e, "Fetch task aborted");
            }
        }

        self.close().await;
        tracing::info!(adapter = %self.name, "Poll adapter stopped");
    }

    /// Close every open session.
    pub async fn close(&self) {
        for slot in &self.slots {
            slot.session.lock().await.take();
        }
    }
}

/// Run a fetch in its own task so a panic only affects this target.
async fn isolated<S: PollSource>(
    ctx: FetchContext<S>,
    guard: OwnedMutexGuard<Option<S::Session>>,
    stats: Arc<AdapterStats>,
) -> FetchOutcome {
    let adapter = ctx.adapter.clone();
    let id = ctx.id.clone();
    let store = ctx.store.clone();

    let outcome = match tokio::spawn(fetch(ctx, guard)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // The session was taken out of the slot before the panic and
            // dropped while unwinding.
            tracing::error!(adapter = %adapter, target = %id, error = %e, "Fetch panicked");
            store.upsert(&id, Tags::new, |obs| obs.clear());
            FetchOutcome::Failed
        }
    };
    stats.record_fetch(outcome);
    outcome
}

async fn fetch<S: PollSource>(
    ctx: FetchContext<S>,
    mut guard: OwnedMutexGuard<Option<S::Session>>,
) -> FetchOutcome {
    let started = Instant::now();
    let open = guard.take();

    let result = tokio::time::timeout(ctx.timeout, async {
        let mut session = match open {
            Some(session) => session,
            None => {
                tracing::debug!(adapter = %ctx.adapter, target = %ctx.id, "Connecting");
                ctx.source.connect().await?
            }
        };
        let fields = ctx.source.read(&mut session).await?;
        Ok::<_, FetchError>((session, fields))
    })
    .await
    .unwrap_or(Err(FetchError::Timeout(ctx.timeout)));

    match result {
        Ok((session, fields)) => {
            *guard = Some(session);
            tracing::trace!(
                adapter = %ctx.adapter,
                target = %ctx.id,
                fields = fields.len(),
                "Fetch succeeded"
            );
            ctx.store
                .upsert(&ctx.id, || ctx.tags.clone(), |obs| obs.record(started, fields));
            FetchOutcome::Updated
        }
        Err(e) => {
            tracing::warn!(
                adapter = %ctx.adapter,
                target = %ctx.id,
                kind = e.kind(),
                error = %e,
                "Fetch failed, clearing fields"
            );
            ctx.store
                .upsert(&ctx.id, || ctx.tags.clone(), |obs| obs.clear());
            FetchOutcome::Failed
        }
    }
}
