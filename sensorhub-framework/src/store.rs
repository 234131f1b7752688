//! Observation store.
//!
//! A keyed cache of the last known reading of every observed entity. Writers
//! (ingestion adapters) and readers (metric callbacks) share one
//! [`ObservationStore`] handle; entries are immutable [`Observation`] values
//! swapped in whole behind an `Arc`, so a reader never sees a half-applied
//! update.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

use sensorhub_common::{EntityId, Fields, Tags};

/// Last known state of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    id: EntityId,
    tags: Tags,
    fields: Fields,
    last_update: Option<Instant>,
}

impl Observation {
    /// A fresh observation with identity tags and no readings.
    pub fn new(id: EntityId, tags: Tags) -> Self {
        Self {
            id,
            tags,
            fields: Fields::new(),
            last_update: None,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name)
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Time elapsed since the last update, `None` if never updated.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.last_update
            .map(|at| now.saturating_duration_since(at))
    }

    /// Whether a write stamped `at` may be applied.
    ///
    /// Writes older than the current `last_update` are rejected so a slow
    /// reader cannot roll the entity back.
    pub fn accepts(&self, at: Instant) -> bool {
        self.last_update.is_none_or(|last| at >= last)
    }

    /// Replace all fields with a complete reading taken at `at`.
    pub fn record(mut self, at: Instant, fields: Fields) -> Self {
        if self.accepts(at) {
            self.fields = fields;
            self.last_update = Some(at);
        }
        self
    }

    /// Overwrite the fields present in `fields`, keep the others.
    pub fn merge(mut self, at: Instant, fields: Fields) -> Self {
        if self.accepts(at) {
            self.fields.merge(fields);
            self.last_update = Some(at);
        }
        self
    }

    /// Refresh `last_update` without touching fields.
    pub fn touch(mut self, at: Instant) -> Self {
        if self.accepts(at) {
            self.last_update = Some(at);
        }
        self
    }

    /// Set a single field.
    pub fn set(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.set(name, value);
        self
    }

    /// Drop every field. Identity and `last_update` are kept.
    pub fn clear(mut self) -> Self {
        self.fields.clear();
        self
    }
}

/// Concurrency-safe map `EntityId -> Observation`.
///
/// Cloning the store clones the handle, not the data. A single lock guards
/// the map: entity counts are tens, and the critical sections are a map
/// lookup plus an `Arc` swap.
#[derive(Debug, Clone, Default)]
pub struct ObservationStore {
    entries: Arc<RwLock<HashMap<EntityId, Arc<Observation>>>>,
}

impl ObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entry with identity tags if `id` is not present yet.
    pub fn register(&self, id: EntityId, tags: Tags) {
        let mut entries = self.entries.write();
        entries
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Observation::new(id, tags)));
    }

    /// Fetch-or-create the entry for `id` and replace it with `mutate(entry)`.
    ///
    /// `seed` supplies the static tags when the entry is created. Upserts are
    /// serialized; `mutate` runs under the write lock and must not block.
    pub fn upsert<T, M>(&self, id: &EntityId, seed: T, mutate: M)
    where
        T: FnOnce() -> Tags,
        M: FnOnce(Observation) -> Observation,
    {
        let mut entries = self.entries.write();
        let current = match entries.get(id) {
            Some(existing) => Observation::clone(existing),
            None => Observation::new(id.clone(), seed()),
        };
        let next = mutate(current);
        debug_assert_eq!(next.id(), id, "mutate must keep the entity id");
        entries.insert(id.clone(), Arc::new(next));
    }

    pub fn get(&self, id: &EntityId) -> Option<Arc<Observation>> {
        self.entries.read().get(id).cloned()
    }

    /// Point-in-time copy of every entry, ordered by id.
    pub fn snapshot(&self) -> Vec<Arc<Observation>> {
        let mut entries: Vec<_> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.id().cmp(b.id()));
        entries
    }

    /// Remove one entry. Returns whether it existed.
    pub fn evict(&self, id: &EntityId) -> bool {
        self.entries.write().remove(id).is_some()
    }

    /// Remove every entry matching `predicate`. Returns how many were removed.
    pub fn evict_where<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&Observation) -> bool,
    {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, obs| !predicate(obs));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorhub_common::MacAddress;

    fn mac(v: u64) -> EntityId {
        EntityId::Mac(MacAddress::new(v).unwrap())
    }

    #[test]
    fn test_register_is_idempotent() {
        let store = ObservationStore::new();
        store.register(mac(1), Tags::new().with("name", "first"));
        store.register(mac(1), Tags::new().with("name", "second"));

        assert_eq!(store.len(), 1);
        let obs = store.get(&mac(1)).unwrap();
        assert_eq!(obs.tags().get("name").unwrap().to_string(), "first");
        assert!(obs.last_update().is_none());
    }

    #[test]
    fn test_upsert_creates_with_seed_tags() {
        let store = ObservationStore::new();
        let now = Instant::now();

        store.upsert(
            &mac(1),
            || Tags::new().with("model", "switchbot"),
            |obs| obs.merge(now, Fields::new().with("temperature", 21.5)),
        );

        let obs = store.get(&mac(1)).unwrap();
        assert_eq!(obs.field("temperature"), Some(21.5));
        assert_eq!(obs.last_update(), Some(now));
        assert_eq!(obs.tags().len(), 1);
    }

    #[test]
    fn test_upsert_seed_not_called_for_existing() {
        let store = ObservationStore::new();
        store.register(mac(1), Tags::new());
        store.upsert(&mac(1), || panic!("seed called"), |obs| obs.set("rssi", -60.0));

        assert_eq!(store.get(&mac(1)).unwrap().field("rssi"), Some(-60.0));
    }

    #[test]
    fn test_snapshot_survives_later_writes() {
        let store = ObservationStore::new();
        let now = Instant::now();
        store.upsert(&mac(1), Tags::new, |obs| {
            obs.record(now, Fields::new().with("power", 10.0))
        });

        let snapshot = store.snapshot();
        store.upsert(&mac(1), Tags::new, |obs| {
            obs.record(now + Duration::from_secs(1), Fields::new().with("power", 20.0))
        });

        assert_eq!(snapshot[0].field("power"), Some(10.0));
        assert_eq!(store.get(&mac(1)).unwrap().field("power"), Some(20.0));
    }

    #[test]
    fn test_snapshot_is_ordered() {
        let store = ObservationStore::new();
        for v in [3, 1, 2] {
            store.register(mac(v), Tags::new());
        }
        let ids: Vec<_> = store.snapshot().iter().map(|o| o.id().clone()).collect();
        assert_eq!(ids, vec![mac(1), mac(2), mac(3)]);
    }

    #[test]
    fn test_record_ignores_older_writes() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(5);

        let obs = Observation::new(mac(1), Tags::new())
            .record(t1, Fields::new().with("temperature", 25.0))
            .record(t0, Fields::new().with("temperature", 19.0));

        assert_eq!(obs.field("temperature"), Some(25.0));
        assert_eq!(obs.last_update(), Some(t1));

        let obs = obs.touch(t0);
        assert_eq!(obs.last_update(), Some(t1));
    }

    #[test]
    fn test_record_replaces_merge_keeps() {
        let now = Instant::now();
        let base = Observation::new(mac(1), Tags::new())
            .record(now, Fields::new().with("temperature", 20.0).with("humidity", 50.0));

        let merged = base.clone().merge(now, Fields::new().with("temperature", 21.0));
        assert_eq!(merged.field("humidity"), Some(50.0));

        let replaced = base.record(now, Fields::new().with("temperature", 21.0));
        assert_eq!(replaced.field("humidity"), None);
    }

    #[test]
    fn test_clear_keeps_identity() {
        let now = Instant::now();
        let obs = Observation::new(mac(1), Tags::new().with("name", "plug"))
            .record(now, Fields::new().with("power", 3.0))
            .clear();

        assert!(obs.fields().is_empty());
        assert_eq!(obs.id(), &mac(1));
        assert_eq!(obs.tags().len(), 1);
    }

    #[test]
    fn test_evict_where() {
        let store = ObservationStore::new();
        let now = Instant::now();
        store.register(mac(1), Tags::new());
        store.upsert(&mac(2), Tags::new, |obs| obs.touch(now));

        let removed = store.evict_where(|obs| obs.last_update().is_none());
        assert_eq!(removed, 1);
        assert!(store.get(&mac(1)).is_none());
        assert!(store.evict(&mac(2)));
        assert!(!store.evict(&mac(2)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_upserts_distinct_entities() {
        let store = ObservationStore::new();
        let now = Instant::now();

        std::thread::scope(|scope| {
            for t in 0..8u64 {
                let store = store.clone();
                scope.spawn(move || {
                    for i in 0..100u64 {
                        store.upsert(&mac(t), Tags::new, |obs| {
                            obs.merge(now, Fields::new().with("count", i as f64))
                        });
                    }
                });
            }
        });

        assert_eq!(store.len(), 8);
        for obs in store.snapshot() {
            assert_eq!(obs.field("count"), Some(99.0));
        }
    }
}
