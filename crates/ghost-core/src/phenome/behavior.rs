//! Behavioral memory: tier three of the phenome.
//!
//! Long-lived learned state: per-slot completion history, sacred times,
//! workout preferences, and the last computed behavior patterns. Readers
//! take immutable snapshots (read-copy-update); a concurrent sacred-time
//! designation is observed either entirely or not at all, never torn.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::error::ValidationError;
use crate::events::WorkoutType;
use crate::patterns::UserBehaviorPatterns;

/// Penalties accumulated at a slot before it is promoted to sacred.
pub const SACRED_PENALTY_THRESHOLD: u32 = 3;

/// A weekly recurring time slot: ISO day of week (1 = Monday .. 7 = Sunday)
/// and hour of day (0-23).
///
/// Serialized as `"day:hour"` so it can key a JSON map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSlotKey {
    pub day_of_week: u8,
    pub hour_of_day: u8,
}

impl serde::Serialize for TimeSlotKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}:{}", self.day_of_week, self.hour_of_day))
    }
}

impl<'de> serde::Deserialize<'de> for TimeSlotKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let (day, hour) = raw
            .split_once(':')
            .ok_or_else(|| serde::de::Error::custom("expected 'day:hour'"))?;
        let day_of_week: u8 = day.parse().map_err(serde::de::Error::custom)?;
        let hour_of_day: u8 = hour.parse().map_err(serde::de::Error::custom)?;
        TimeSlotKey::new(day_of_week, hour_of_day)
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

impl TimeSlotKey {
    pub fn new(day_of_week: u8, hour_of_day: u8) -> Result<Self, ValidationError> {
        if !(1..=7).contains(&day_of_week) || hour_of_day > 23 {
            return Err(ValidationError::InvalidTimeSlot {
                day_of_week,
                hour_of_day,
            });
        }
        Ok(Self {
            day_of_week,
            hour_of_day,
        })
    }

    pub fn from_datetime(at: &DateTime<Utc>) -> Self {
        Self {
            day_of_week: at.weekday().number_from_monday() as u8,
            hour_of_day: at.hour() as u8,
        }
    }
}

/// Accumulated completion history for one weekly slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSlotStats {
    pub completed: u32,
    pub missed: u32,
    pub penalties: u32,
    pub last_completed: Option<DateTime<Utc>>,
    pub last_missed: Option<DateTime<Utc>>,
}

impl TimeSlotStats {
    /// Completion rate, defaulting to 0.5 when there is no data.
    pub fn completion_rate(&self) -> f64 {
        let total = self.completed + self.missed;
        if total == 0 {
            0.5
        } else {
            self.completed as f64 / total as f64
        }
    }

    pub fn miss_rate(&self) -> f64 {
        1.0 - self.completion_rate()
    }

    pub fn data_points(&self) -> u32 {
        self.completed + self.missed
    }
}

/// Why a slot was elevated to sacred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SacredTimeReason {
    RepeatedDeletions,
    UserSpecified,
    WeekendMorning,
    LunchHour,
    PersonalEvent,
}

/// A slot the engine must never propose into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SacredTime {
    pub slot: TimeSlotKey,
    pub reason: SacredTimeReason,
    pub designated_at: DateTime<Utc>,
}

/// Learned workout preferences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutPreferences {
    pub favorite_types: Vec<WorkoutType>,
    /// Hours of day the user historically trains in, best first.
    pub preferred_hours: Vec<u8>,
    pub typical_duration_minutes: u32,
}

/// The immutable snapshot readers work against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehavioralMemory {
    pub slot_stats: BTreeMap<TimeSlotKey, TimeSlotStats>,
    pub sacred_times: Vec<SacredTime>,
    pub preferences: WorkoutPreferences,
    pub patterns: Option<UserBehaviorPatterns>,
}

impl BehavioralMemory {
    pub fn is_sacred(&self, slot: TimeSlotKey) -> bool {
        self.sacred_times.iter().any(|s| s.slot == slot)
    }

    pub fn slot_stats(&self, slot: TimeSlotKey) -> Option<&TimeSlotStats> {
        self.slot_stats.get(&slot)
    }
}

/// Single-writer store with snapshot reads.
///
/// Writers clone the current memory, mutate the clone, and swap it in;
/// readers hold an `Arc` to whichever version was current when they asked.
#[derive(Debug, Default)]
pub struct BehavioralMemoryStore {
    inner: RwLock<Arc<BehavioralMemory>>,
}

impl BehavioralMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_memory(memory: BehavioralMemory) -> Self {
        Self {
            inner: RwLock::new(Arc::new(memory)),
        }
    }

    /// Immutable snapshot of the whole memory.
    pub fn snapshot(&self) -> Arc<BehavioralMemory> {
        self.inner.read().expect("behavioral memory lock poisoned").clone()
    }

    /// Swap a previously taken snapshot back in, discarding writes made
    /// since. Used to undo the behavioral side effects of an event whose
    /// persistence failed.
    pub fn restore_snapshot(&self, snapshot: Arc<BehavioralMemory>) {
        *self.inner.write().expect("behavioral memory lock poisoned") = snapshot;
    }

    fn update<F: FnOnce(&mut BehavioralMemory)>(&self, f: F) {
        let mut guard = self.inner.write().expect("behavioral memory lock poisoned");
        let mut next = (**guard).clone();
        f(&mut next);
        *guard = Arc::new(next);
    }

    pub fn record_slot_completed(&self, slot: TimeSlotKey, at: DateTime<Utc>) {
        self.update(|m| {
            let stats = m.slot_stats.entry(slot).or_default();
            stats.completed += 1;
            stats.last_completed = Some(at);
        });
    }

    pub fn record_slot_missed(&self, slot: TimeSlotKey, at: DateTime<Utc>) {
        self.update(|m| {
            let stats = m.slot_stats.entry(slot).or_default();
            stats.missed += 1;
            stats.last_missed = Some(at);
        });
    }

    /// Record a penalty against a slot (a deletion of a block proposed
    /// there). The third accumulated penalty promotes the slot to sacred.
    /// Returns the sacred time if this call promoted it.
    pub fn record_penalty(&self, slot: TimeSlotKey, at: DateTime<Utc>) -> Option<SacredTime> {
        let mut promoted = None;
        self.update(|m| {
            let stats = m.slot_stats.entry(slot).or_default();
            stats.penalties += 1;
            if stats.penalties >= SACRED_PENALTY_THRESHOLD && !m.is_sacred(slot) {
                let sacred = SacredTime {
                    slot,
                    reason: SacredTimeReason::RepeatedDeletions,
                    designated_at: at,
                };
                info!(?slot, "slot promoted to sacred after repeated deletions");
                m.sacred_times.push(sacred.clone());
                promoted = Some(sacred);
            }
        });
        promoted
    }

    /// Explicit user designation. Idempotent per slot.
    pub fn designate_sacred(&self, slot: TimeSlotKey, reason: SacredTimeReason, at: DateTime<Utc>) {
        self.update(|m| {
            if !m.is_sacred(slot) {
                m.sacred_times.push(SacredTime {
                    slot,
                    reason,
                    designated_at: at,
                });
            }
        });
    }

    pub fn set_preferences(&self, preferences: WorkoutPreferences) {
        self.update(|m| m.preferences = preferences);
    }

    pub fn set_patterns(&self, patterns: UserBehaviorPatterns) {
        self.update(|m| m.patterns = Some(patterns));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 7, 0, 0).unwrap()
    }

    fn slot() -> TimeSlotKey {
        TimeSlotKey::new(1, 7).unwrap()
    }

    #[test]
    fn test_slot_key_validation() {
        assert!(TimeSlotKey::new(0, 7).is_err());
        assert!(TimeSlotKey::new(8, 7).is_err());
        assert!(TimeSlotKey::new(3, 24).is_err());
        assert!(TimeSlotKey::new(7, 23).is_ok());
    }

    #[test]
    fn test_slot_key_from_datetime() {
        // 2025-06-02 is a Monday.
        let key = TimeSlotKey::from_datetime(&t0());
        assert_eq!(key.day_of_week, 1);
        assert_eq!(key.hour_of_day, 7);
    }

    #[test]
    fn test_slot_key_serde_as_map_key() {
        let mut stats = BTreeMap::new();
        stats.insert(TimeSlotKey::new(3, 17).unwrap(), TimeSlotStats::default());
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"3:17\""));
        let back: BTreeMap<TimeSlotKey, TimeSlotStats> = serde_json::from_str(&json).unwrap();
        assert!(back.contains_key(&TimeSlotKey::new(3, 17).unwrap()));
    }

    #[test]
    fn test_completion_rate_defaults_to_half() {
        let stats = TimeSlotStats::default();
        assert_eq!(stats.completion_rate(), 0.5);
    }

    #[test]
    fn test_third_penalty_promotes_sacred() {
        let store = BehavioralMemoryStore::new();
        assert!(store.record_penalty(slot(), t0()).is_none());
        assert!(store.record_penalty(slot(), t0()).is_none());
        let sacred = store.record_penalty(slot(), t0()).unwrap();
        assert_eq!(sacred.reason, SacredTimeReason::RepeatedDeletions);
        assert!(store.snapshot().is_sacred(slot()));
        // A fourth penalty does not duplicate the designation.
        assert!(store.record_penalty(slot(), t0()).is_none());
        assert_eq!(store.snapshot().sacred_times.len(), 1);
    }

    #[test]
    fn test_snapshot_isolation() {
        let store = BehavioralMemoryStore::new();
        store.record_slot_completed(slot(), t0());
        let before = store.snapshot();
        store.record_slot_completed(slot(), t0());
        let after = store.snapshot();
        // The earlier snapshot is unaffected by the later write.
        assert_eq!(before.slot_stats.get(&slot()).unwrap().completed, 1);
        assert_eq!(after.slot_stats.get(&slot()).unwrap().completed, 2);
    }

    #[test]
    fn test_user_designation_idempotent() {
        let store = BehavioralMemoryStore::new();
        store.designate_sacred(slot(), SacredTimeReason::LunchHour, t0());
        store.designate_sacred(slot(), SacredTimeReason::UserSpecified, t0());
        let snapshot = store.snapshot();
        assert_eq!(snapshot.sacred_times.len(), 1);
        assert_eq!(snapshot.sacred_times[0].reason, SacredTimeReason::LunchHour);
    }
}
