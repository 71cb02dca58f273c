//! Raw signal store: tier one of the phenome.
//!
//! Append-only records as delivered by the ingestion adapters -- sleep,
//! HRV, resting heart rate, detected workouts. Records are pruned past the
//! retention horizon (90 days by default) and never mutated in place.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::events::DetectedWorkout;

/// One night of sleep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepRecord {
    pub id: String,
    /// The night this record describes (date the user woke up).
    pub night_of: NaiveDate,
    pub asleep_hours: f64,
    /// Sleep efficiency 0.0-1.0 when the source reports it.
    pub efficiency: Option<f64>,
}

/// A heart-rate-variability reading (SDNN, milliseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrvReading {
    pub id: String,
    pub at: DateTime<Utc>,
    pub sdnn_ms: f64,
}

/// A resting heart rate sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestingHrSample {
    pub id: String,
    pub at: DateTime<Utc>,
    pub bpm: f64,
}

/// Append-only store for raw health signals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSignalStore {
    sleep: Vec<SleepRecord>,
    hrv: Vec<HrvReading>,
    resting_hr: Vec<RestingHrSample>,
    workouts: Vec<DetectedWorkout>,
}

impl RawSignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Appends (id-deduplicated) ────────────────────────────────────

    pub fn append_sleep(&mut self, record: SleepRecord) {
        if !self.sleep.iter().any(|r| r.id == record.id) {
            self.sleep.push(record);
        }
    }

    pub fn append_hrv(&mut self, reading: HrvReading) {
        if !self.hrv.iter().any(|r| r.id == reading.id) {
            self.hrv.push(reading);
        }
    }

    pub fn append_resting_hr(&mut self, sample: RestingHrSample) {
        if !self.resting_hr.iter().any(|r| r.id == sample.id) {
            self.resting_hr.push(sample);
        }
    }

    pub fn append_workout(&mut self, workout: DetectedWorkout) {
        if !self.workouts.iter().any(|w| w.id == workout.id) {
            self.workouts.push(workout);
        }
    }

    // ── Windowed reads ───────────────────────────────────────────────

    pub fn sleep_since(&self, cutoff: NaiveDate) -> Vec<&SleepRecord> {
        let mut records: Vec<_> = self.sleep.iter().filter(|r| r.night_of >= cutoff).collect();
        records.sort_by_key(|r| r.night_of);
        records
    }

    pub fn hrv_since(&self, cutoff: DateTime<Utc>) -> Vec<&HrvReading> {
        let mut readings: Vec<_> = self.hrv.iter().filter(|r| r.at >= cutoff).collect();
        readings.sort_by_key(|r| r.at);
        readings
    }

    pub fn resting_hr_since(&self, cutoff: DateTime<Utc>) -> Vec<&RestingHrSample> {
        let mut samples: Vec<_> = self.resting_hr.iter().filter(|r| r.at >= cutoff).collect();
        samples.sort_by_key(|r| r.at);
        samples
    }

    pub fn workouts_since(&self, cutoff: DateTime<Utc>) -> Vec<&DetectedWorkout> {
        let mut workouts: Vec<_> = self
            .workouts
            .iter()
            .filter(|w| w.end_date >= cutoff)
            .collect();
        workouts.sort_by_key(|w| w.start_date);
        workouts
    }

    pub fn workout_count(&self) -> usize {
        self.workouts.len()
    }

    /// Drop everything older than the retention horizon.
    pub fn prune(&mut self, now: DateTime<Utc>, retention_days: i64) {
        let cutoff = now - Duration::days(retention_days);
        let date_cutoff = cutoff.date_naive();
        self.sleep.retain(|r| r.night_of >= date_cutoff);
        self.hrv.retain(|r| r.at >= cutoff);
        self.resting_hr.retain(|r| r.at >= cutoff);
        self.workouts.retain(|w| w.end_date >= cutoff);
    }
}
