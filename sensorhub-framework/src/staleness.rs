//! Staleness policy.

use std::time::Duration;

use tokio::time::Instant;

use crate::store::Observation;

/// Maximum age after which an observation is no longer reported.
///
/// `max_age == None` disables the check: everything is reportable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StalenessPolicy {
    max_age: Option<Duration>,
}

impl StalenessPolicy {
    pub fn new(max_age: Duration) -> Self {
        if max_age.is_zero() {
            return Self::disabled();
        }
        Self {
            max_age: Some(max_age),
        }
    }

    /// Build from a signed millisecond setting. Zero or negative disables.
    pub fn from_millis(millis: i64) -> Self {
        if millis <= 0 {
            Self::disabled()
        } else {
            Self::new(Duration::from_millis(millis as u64))
        }
    }

    pub fn disabled() -> Self {
        Self { max_age: None }
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn is_enabled(&self) -> bool {
        self.max_age.is_some()
    }

    pub fn is_stale(&self, observation: &Observation, now: Instant) -> bool {
        match self.max_age {
            Some(max_age) => is_stale(observation, now, max_age),
            None => false,
        }
    }
}

/// `true` iff `now - last_update > max_age`.
///
/// An observation at exactly `max_age` is still fresh. One that was never
/// updated is stale, unless `max_age` is zero (disabled).
pub fn is_stale(observation: &Observation, now: Instant, max_age: Duration) -> bool {
    if max_age.is_zero() {
        return false;
    }
    match observation.age(now) {
        Some(age) => age > max_age,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorhub_common::{EntityId, Fields, Tags};

    fn observed_at(at: Instant) -> Observation {
        Observation::new(EntityId::key("probe").unwrap(), Tags::new())
            .record(at, Fields::new().with("value", 1.0))
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let t0 = Instant::now();
        let max_age = Duration::from_millis(1000);
        let obs = observed_at(t0);

        assert!(!is_stale(&obs, t0 + Duration::from_millis(999), max_age));
        assert!(!is_stale(&obs, t0 + max_age, max_age));
        assert!(is_stale(&obs, t0 + Duration::from_millis(1001), max_age));
    }

    #[test]
    fn test_never_updated_is_stale() {
        let obs = Observation::new(EntityId::key("probe").unwrap(), Tags::new());
        let policy = StalenessPolicy::from_millis(500);

        assert!(policy.is_stale(&obs, Instant::now()));
        assert!(!StalenessPolicy::disabled().is_stale(&obs, Instant::now()));
    }

    #[test]
    fn test_zero_or_negative_disables() {
        let t0 = Instant::now();
        let obs = observed_at(t0);
        let later = t0 + Duration::from_secs(3600);

        for millis in [0, -1, -10_000] {
            let policy = StalenessPolicy::from_millis(millis);
            assert!(!policy.is_enabled());
            assert!(!policy.is_stale(&obs, later));
        }
        assert!(!is_stale(&obs, later, Duration::ZERO));
        assert_eq!(StalenessPolicy::new(Duration::ZERO), StalenessPolicy::disabled());
    }

    #[test]
    fn test_clock_before_update_is_fresh() {
        let t0 = Instant::now();
        let obs = observed_at(t0 + Duration::from_secs(1));
        assert!(!is_stale(&obs, t0, Duration::from_millis(1)));
    }
}
