//! The phenome: three-tier data model.
//!
//! Tier one holds raw signals as ingested, tier two the state derived from
//! them, tier three long-lived behavioral memory. Each store has a single
//! writer; cross-store access goes through typed read APIs returning
//! snapshots.

pub mod behavior;
pub mod derived;
pub mod raw;

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use behavior::{
    BehavioralMemory, BehavioralMemoryStore, SacredTime, SacredTimeReason, TimeSlotKey,
    TimeSlotStats, WorkoutPreferences, SACRED_PENALTY_THRESHOLD,
};
pub use derived::{DerivedStateStore, MorningState, WorkoutStatistics};
pub use raw::{HrvReading, RawSignalStore, RestingHrSample, SleepRecord};

/// Coordinator owning the three phenome stores.
///
/// Raw signals append-with-prune, derived state read-modify-write under a
/// lock, behavioral memory read-copy-update. Nothing here touches trust
/// state.
#[derive(Debug, Default)]
pub struct PhenomeCoordinator {
    raw: RwLock<RawSignalStore>,
    derived: RwLock<DerivedStateStore>,
    behavior: BehavioralMemoryStore,
}

impl PhenomeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: BehavioralMemory) -> Self {
        Self {
            raw: RwLock::new(RawSignalStore::new()),
            derived: RwLock::new(DerivedStateStore::new()),
            behavior: BehavioralMemoryStore::from_memory(behavior),
        }
    }

    pub fn raw(&self) -> RwLockReadGuard<'_, RawSignalStore> {
        self.raw.read().expect("raw signal lock poisoned")
    }

    pub fn raw_mut(&self) -> RwLockWriteGuard<'_, RawSignalStore> {
        self.raw.write().expect("raw signal lock poisoned")
    }

    pub fn derived(&self) -> RwLockReadGuard<'_, DerivedStateStore> {
        self.derived.read().expect("derived state lock poisoned")
    }

    pub fn derived_mut(&self) -> RwLockWriteGuard<'_, DerivedStateStore> {
        self.derived.write().expect("derived state lock poisoned")
    }

    pub fn behavior(&self) -> &BehavioralMemoryStore {
        &self.behavior
    }

    /// Immutable snapshot of behavioral memory.
    pub fn behavior_snapshot(&self) -> Arc<BehavioralMemory> {
        self.behavior.snapshot()
    }

    /// Apply both retention horizons.
    pub fn prune(&self, now: DateTime<Utc>, raw_retention_days: i64, derived_retention_days: i64) {
        self.raw_mut().prune(now, raw_retention_days);
        self.derived_mut().prune(now, derived_retention_days);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DetectedWorkout, WorkoutType};
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_prune_applies_both_horizons() {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 30, 6, 0, 0).unwrap();
        let coordinator = PhenomeCoordinator::new();
        coordinator.raw_mut().append_workout(DetectedWorkout::new(
            WorkoutType::Run,
            t0 - Duration::days(120),
            t0 - Duration::days(120) + Duration::minutes(40),
            250.0,
        ));
        coordinator.raw_mut().append_workout(DetectedWorkout::new(
            WorkoutType::Run,
            t0 - Duration::days(5),
            t0 - Duration::days(5) + Duration::minutes(40),
            250.0,
        ));
        coordinator.prune(t0, 90, 30);
        assert_eq!(coordinator.raw().workout_count(), 1);
    }
}
