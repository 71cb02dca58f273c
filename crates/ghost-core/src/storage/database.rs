//! SQLite-backed persistence.
//!
//! Implements [`PhenomePersistence`] and [`ReceiptSink`] over a typed,
//! versioned row schema: trust state, behavioral memory, raw signals,
//! derived state, receipts with a TTL, and the metric provenance log.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{PersistenceError, ProviderError};
use crate::events::{BlockStatus, DetectedWorkout, TrainingBlock, WorkoutType};
use crate::metrics::{MetricVersion, ProvenanceEntry};
use crate::phenome::behavior::{
    BehavioralMemory, SacredTime, SacredTimeReason, TimeSlotKey, TimeSlotStats, WorkoutPreferences,
};
use crate::phenome::derived::MorningState;
use crate::phenome::raw::{HrvReading, RestingHrSample, SleepRecord};
use crate::providers::{PersistedState, PhenomePersistence, ReceiptSink};
use crate::receipt::DecisionReceipt;
use crate::recovery::RecoveryStatus;
use crate::trust::machine::TrustRecord;
use crate::trust::phase::TrustPhase;

use super::migrations;

const DEFAULT_RECEIPT_TTL_DAYS: i64 = 90;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite database holding all persisted engine state.
pub struct Database {
    conn: Mutex<Connection>,
    receipt_ttl_days: i64,
}

impl Database {
    /// Open (and migrate) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path).map_err(|source| PersistenceError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open the database at the platform data directory.
    pub fn open_default() -> Result<Self, PersistenceError> {
        let dir = default_data_dir()?;
        std::fs::create_dir_all(&dir)
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        Self::open(&dir.join("ghost.db"))
    }

    /// In-memory database, primarily for tests.
    pub fn open_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, PersistenceError> {
        migrations::migrate(&conn)
            .map_err(|e| PersistenceError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            receipt_ttl_days: DEFAULT_RECEIPT_TTL_DAYS,
        })
    }

    pub fn with_receipt_ttl_days(mut self, days: i64) -> Self {
        self.receipt_ttl_days = days.max(1);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }

    // ── Trust + behavioral state ─────────────────────────────────────

    pub fn save_state(&self, state: &PersistedState) -> Result<(), PersistenceError> {
        let mut conn = self.lock();
        let tx = conn
            .transaction()
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;

        tx.execute(
            "INSERT OR REPLACE INTO trust_state
             (id, phase, trust_score, consecutive_deletes, consecutive_workout_days,
              last_workout_day, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                state.trust.phase.as_str(),
                state.trust.trust_score,
                state.trust.consecutive_deletes,
                state.trust.consecutive_workout_days,
                state.trust.last_workout_day.map(|d| d.format(DATE_FORMAT).to_string()),
                state.trust.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;

        tx.execute("DELETE FROM slot_stats", [])
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        for (slot, stats) in &state.behavioral.slot_stats {
            tx.execute(
                "INSERT INTO slot_stats
                 (day_of_week, hour_of_day, completed, missed, penalties,
                  last_completed, last_missed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    slot.day_of_week,
                    slot.hour_of_day,
                    stats.completed,
                    stats.missed,
                    stats.penalties,
                    stats.last_completed.map(|t| t.to_rfc3339()),
                    stats.last_missed.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        }

        tx.execute("DELETE FROM sacred_times", [])
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        for sacred in &state.behavioral.sacred_times {
            tx.execute(
                "INSERT OR REPLACE INTO sacred_times
                 (day_of_week, hour_of_day, reason, designated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    sacred.slot.day_of_week,
                    sacred.slot.hour_of_day,
                    sacred_reason_str(sacred.reason),
                    sacred.designated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO preferences (id, typical_duration_minutes) VALUES (1, ?1)",
            params![state.behavioral.preferences.typical_duration_minutes],
        )
        .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        tx.execute("DELETE FROM preference_types", [])
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        for workout_type in &state.behavioral.preferences.favorite_types {
            tx.execute(
                "INSERT OR REPLACE INTO preference_types (workout_type) VALUES (?1)",
                params![workout_type.as_str()],
            )
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        }
        tx.execute("DELETE FROM preference_hours", [])
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        for (position, hour) in state.behavioral.preferences.preferred_hours.iter().enumerate() {
            tx.execute(
                "INSERT OR REPLACE INTO preference_hours (hour, position) VALUES (?1, ?2)",
                params![hour, position as i64],
            )
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        }

        tx.commit()
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))
    }

    pub fn load_state(&self) -> Result<Option<PersistedState>, PersistenceError> {
        let conn = self.lock();
        let trust = conn
            .query_row(
                "SELECT phase, trust_score, consecutive_deletes, consecutive_workout_days,
                        last_workout_day, updated_at
                 FROM trust_state WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        let Some((phase, trust_score, deletes, streak, last_day, updated_at)) = trust else {
            return Ok(None);
        };

        let trust = TrustRecord {
            phase: parse_phase(&phase)?,
            trust_score,
            consecutive_deletes: deletes,
            consecutive_workout_days: streak,
            last_workout_day: last_day.as_deref().map(parse_date).transpose()?,
            updated_at: parse_datetime(&updated_at)?,
        };

        let mut slot_stats = BTreeMap::new();
        {
            let mut stmt = conn
                .prepare(
                    "SELECT day_of_week, hour_of_day, completed, missed, penalties,
                            last_completed, last_missed
                     FROM slot_stats",
                )
                .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, u8>(0)?,
                        row.get::<_, u8>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                })
                .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
            for row in rows {
                let (day, hour, completed, missed, penalties, last_completed, last_missed) =
                    row.map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
                let slot = TimeSlotKey::new(day, hour)
                    .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
                slot_stats.insert(
                    slot,
                    TimeSlotStats {
                        completed,
                        missed,
                        penalties,
                        last_completed: last_completed.as_deref().map(parse_datetime).transpose()?,
                        last_missed: last_missed.as_deref().map(parse_datetime).transpose()?,
                    },
                );
            }
        }

        let mut sacred_times = Vec::new();
        {
            let mut stmt = conn
                .prepare("SELECT day_of_week, hour_of_day, reason, designated_at FROM sacred_times")
                .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, u8>(0)?,
                        row.get::<_, u8>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
            for row in rows {
                let (day, hour, reason, designated_at) =
                    row.map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
                sacred_times.push(SacredTime {
                    slot: TimeSlotKey::new(day, hour)
                        .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?,
                    reason: parse_sacred_reason(&reason)?,
                    designated_at: parse_datetime(&designated_at)?,
                });
            }
        }

        let typical_duration_minutes = conn
            .query_row(
                "SELECT typical_duration_minutes FROM preferences WHERE id = 1",
                [],
                |row| row.get::<_, u32>(0),
            )
            .optional()
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?
            .unwrap_or(0);
        let favorite_types = {
            let mut stmt = conn
                .prepare("SELECT workout_type FROM preference_types ORDER BY workout_type")
                .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
            let mut types = Vec::new();
            for row in rows {
                let raw = row.map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
                types.push(
                    raw.parse::<WorkoutType>()
                        .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?,
                );
            }
            types
        };
        let preferred_hours = {
            let mut stmt = conn
                .prepare("SELECT hour FROM preference_hours ORDER BY position")
                .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, u8>(0))
                .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?
        };

        Ok(Some(PersistedState {
            trust,
            behavioral: BehavioralMemory {
                slot_stats,
                sacred_times,
                preferences: WorkoutPreferences {
                    favorite_types,
                    preferred_hours,
                    typical_duration_minutes,
                },
                // The pattern cache is recomputable and not persisted.
                patterns: None,
            },
        }))
    }

    // ── Raw signals ──────────────────────────────────────────────────

    pub fn insert_sleep(&self, record: &SleepRecord) -> Result<(), PersistenceError> {
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO sleep_data (id, night_of, asleep_hours, efficiency)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id,
                    record.night_of.format(DATE_FORMAT).to_string(),
                    record.asleep_hours,
                    record.efficiency,
                ],
            )
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub fn insert_hrv(&self, reading: &HrvReading) -> Result<(), PersistenceError> {
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO hrv_data (id, at, sdnn_ms) VALUES (?1, ?2, ?3)",
                params![reading.id, reading.at.to_rfc3339(), reading.sdnn_ms],
            )
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub fn insert_resting_hr(&self, sample: &RestingHrSample) -> Result<(), PersistenceError> {
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO resting_hr_data (id, at, bpm) VALUES (?1, ?2, ?3)",
                params![sample.id, sample.at.to_rfc3339(), sample.bpm],
            )
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub fn insert_workout(&self, workout: &DetectedWorkout) -> Result<(), PersistenceError> {
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO workouts
                 (id, workout_type, start_date, end_date, duration_minutes,
                  active_calories, average_heart_rate, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    workout.id,
                    workout.workout_type.as_str(),
                    workout.start_date.to_rfc3339(),
                    workout.end_date.to_rfc3339(),
                    workout.duration_minutes,
                    workout.active_calories,
                    workout.average_heart_rate,
                    workout.source,
                ],
            )
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub fn load_workouts(&self) -> Result<Vec<DetectedWorkout>, PersistenceError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, workout_type, start_date, end_date, duration_minutes,
                        active_calories, average_heart_rate, source
                 FROM workouts ORDER BY start_date",
            )
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, Option<f64>>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        let mut workouts = Vec::new();
        for row in rows {
            let (id, workout_type, start, end, duration, calories, hr, source) =
                row.map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
            workouts.push(DetectedWorkout {
                id,
                workout_type: workout_type
                    .parse()
                    .map_err(|e: crate::error::ValidationError| {
                        PersistenceError::QueryFailed(e.to_string())
                    })?,
                start_date: parse_datetime(&start)?,
                end_date: parse_datetime(&end)?,
                duration_minutes: duration,
                active_calories: calories,
                average_heart_rate: hr,
                source,
            });
        }
        Ok(workouts)
    }

    // ── Derived state ────────────────────────────────────────────────

    pub fn upsert_block(&self, block: &TrainingBlock) -> Result<(), PersistenceError> {
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO training_blocks
                 (id, calendar_event_id, workout_type, start_time, end_time,
                  was_auto_scheduled, status, generated_workout)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    block.id,
                    block.calendar_event_id,
                    block.workout_type.as_str(),
                    block.start_time.to_rfc3339(),
                    block.end_time.to_rfc3339(),
                    block.was_auto_scheduled,
                    block.status.as_str(),
                    block.generated_workout,
                ],
            )
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub fn load_blocks(&self) -> Result<Vec<TrainingBlock>, PersistenceError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, calendar_event_id, workout_type, start_time, end_time,
                        was_auto_scheduled, status, generated_workout
                 FROM training_blocks ORDER BY start_time",
            )
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        let mut blocks = Vec::new();
        for row in rows {
            let (id, calendar_event_id, workout_type, start, end, auto, status, generated) =
                row.map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
            blocks.push(TrainingBlock {
                id,
                calendar_event_id,
                workout_type: workout_type
                    .parse()
                    .map_err(|e: crate::error::ValidationError| {
                        PersistenceError::QueryFailed(e.to_string())
                    })?,
                start_time: parse_datetime(&start)?,
                end_time: parse_datetime(&end)?,
                was_auto_scheduled: auto,
                status: parse_status(&status)?,
                generated_workout: generated,
            });
        }
        Ok(blocks)
    }

    pub fn insert_morning_state(&self, state: &MorningState) -> Result<(), PersistenceError> {
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO morning_states
                 (date, recovery_score, recovery_status, high_risk_blocks,
                  proposals_emitted, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    state.date.format(DATE_FORMAT).to_string(),
                    state.recovery_score,
                    recovery_status_str(state.recovery_status),
                    state.high_risk_blocks,
                    state.proposals_emitted,
                    state.computed_at.to_rfc3339(),
                ],
            )
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    // ── Receipts (with TTL) ──────────────────────────────────────────

    pub fn insert_receipt(&self, receipt: &DecisionReceipt) -> Result<(), PersistenceError> {
        let payload = serde_json::to_string(receipt)
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        let expires_at = receipt.timestamp + Duration::days(self.receipt_ttl_days);
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO receipts
                 (id, timestamp, receipt_type, confidence, decision, payload, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    receipt.id,
                    receipt.timestamp.to_rfc3339(),
                    receipt.receipt_type.as_str(),
                    receipt.confidence,
                    receipt.decision,
                    payload,
                    expires_at.to_rfc3339(),
                ],
            )
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    pub fn receipt_count(&self) -> Result<u32, PersistenceError> {
        self.lock()
            .query_row("SELECT COUNT(*) FROM receipts", [], |row| row.get(0))
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))
    }

    /// Delete receipts past their TTL and raw signals past retention.
    pub fn prune_expired(
        &self,
        now: DateTime<Utc>,
        raw_retention_days: i64,
    ) -> Result<(), PersistenceError> {
        let conn = self.lock();
        let now_str = now.to_rfc3339();
        conn.execute("DELETE FROM receipts WHERE expires_at < ?1", params![now_str])
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        let cutoff = (now - Duration::days(raw_retention_days)).to_rfc3339();
        let date_cutoff = (now - Duration::days(raw_retention_days))
            .date_naive()
            .format(DATE_FORMAT)
            .to_string();
        conn.execute("DELETE FROM sleep_data WHERE night_of < ?1", params![date_cutoff])
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        conn.execute("DELETE FROM hrv_data WHERE at < ?1", params![cutoff])
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        conn.execute("DELETE FROM resting_hr_data WHERE at < ?1", params![cutoff])
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        conn.execute("DELETE FROM workouts WHERE end_date < ?1", params![cutoff])
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    // ── Metric provenance ────────────────────────────────────────────

    pub fn save_provenance(&self, entries: &[ProvenanceEntry]) -> Result<(), PersistenceError> {
        let mut conn = self.lock();
        let tx = conn
            .transaction()
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        tx.execute("DELETE FROM metric_provenance", [])
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        for entry in entries {
            tx.execute(
                "INSERT INTO metric_provenance (metric, version, input_digest, output, at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.metric,
                    entry.version.to_string(),
                    entry.input_digest.to_string(),
                    entry.output,
                    entry.at.to_rfc3339(),
                ],
            )
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;
        }
        tx.commit()
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))
    }

    pub fn load_provenance(&self) -> Result<Vec<ProvenanceEntry>, PersistenceError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT metric, version, input_digest, output, at
                 FROM metric_provenance ORDER BY seq",
            )
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        let mut entries = Vec::new();
        for row in rows {
            let (metric, version, digest, output, at) =
                row.map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
            let version = MetricVersion::parse(&version).ok_or_else(|| {
                PersistenceError::MetricVersionMismatch {
                    metric: metric.clone(),
                    stored: version.clone(),
                    expected: "major.minor".into(),
                }
            })?;
            entries.push(ProvenanceEntry {
                metric,
                version,
                input_digest: digest
                    .parse()
                    .map_err(|_| PersistenceError::QueryFailed("bad digest".into()))?,
                output,
                at: parse_datetime(&at)?,
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl PhenomePersistence for Database {
    async fn load(&self) -> Result<Option<PersistedState>, ProviderError> {
        self.load_state().map_err(|e| ProviderError::Transient(e.to_string()))
    }

    async fn save(&self, state: &PersistedState) -> Result<(), ProviderError> {
        self.save_state(state).map_err(|e| ProviderError::Transient(e.to_string()))
    }
}

#[async_trait]
impl ReceiptSink for Database {
    async fn emit(&self, receipt: DecisionReceipt) -> Result<(), ProviderError> {
        self.insert_receipt(&receipt)
            .map_err(|e| ProviderError::Transient(e.to_string()))
    }
}

fn default_data_dir() -> Result<PathBuf, PersistenceError> {
    dirs::data_dir()
        .map(|d| d.join("ghost"))
        .ok_or_else(|| PersistenceError::QueryFailed("no platform data directory".into()))
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PersistenceError::QueryFailed(format!("bad timestamp '{raw}': {e}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate, PersistenceError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| PersistenceError::QueryFailed(format!("bad date '{raw}': {e}")))
}

fn parse_phase(raw: &str) -> Result<TrustPhase, PersistenceError> {
    TrustPhase::ALL
        .into_iter()
        .find(|p| p.as_str() == raw)
        .ok_or_else(|| PersistenceError::QueryFailed(format!("unknown phase '{raw}'")))
}

fn parse_status(raw: &str) -> Result<BlockStatus, PersistenceError> {
    [
        BlockStatus::Scheduled,
        BlockStatus::Completed,
        BlockStatus::Missed,
        BlockStatus::Deleted,
        BlockStatus::Transformed,
    ]
    .into_iter()
    .find(|s| s.as_str() == raw)
    .ok_or_else(|| PersistenceError::QueryFailed(format!("unknown status '{raw}'")))
}

fn sacred_reason_str(reason: SacredTimeReason) -> &'static str {
    match reason {
        SacredTimeReason::RepeatedDeletions => "repeated_deletions",
        SacredTimeReason::UserSpecified => "user_specified",
        SacredTimeReason::WeekendMorning => "weekend_morning",
        SacredTimeReason::LunchHour => "lunch_hour",
        SacredTimeReason::PersonalEvent => "personal_event",
    }
}

fn parse_sacred_reason(raw: &str) -> Result<SacredTimeReason, PersistenceError> {
    match raw {
        "repeated_deletions" => Ok(SacredTimeReason::RepeatedDeletions),
        "user_specified" => Ok(SacredTimeReason::UserSpecified),
        "weekend_morning" => Ok(SacredTimeReason::WeekendMorning),
        "lunch_hour" => Ok(SacredTimeReason::LunchHour),
        "personal_event" => Ok(SacredTimeReason::PersonalEvent),
        _ => Err(PersistenceError::QueryFailed(format!("unknown sacred reason '{raw}'"))),
    }
}

fn recovery_status_str(status: RecoveryStatus) -> &'static str {
    match status {
        RecoveryStatus::FullyRecovered => "fully_recovered",
        RecoveryStatus::PartiallyRecovered => "partially_recovered",
        RecoveryStatus::Fatigued => "fatigued",
        RecoveryStatus::NeedsRest => "needs_rest",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 7, 0, 0).unwrap()
    }

    fn sample_state() -> PersistedState {
        let mut slot_stats = BTreeMap::new();
        slot_stats.insert(
            TimeSlotKey::new(1, 7).unwrap(),
            TimeSlotStats {
                completed: 5,
                missed: 2,
                penalties: 1,
                last_completed: Some(t0()),
                last_missed: None,
            },
        );
        PersistedState {
            trust: TrustRecord {
                phase: TrustPhase::AutoScheduler,
                trust_score: 62.5,
                consecutive_deletes: 1,
                consecutive_workout_days: 4,
                last_workout_day: Some(t0().date_naive()),
                updated_at: t0(),
            },
            behavioral: BehavioralMemory {
                slot_stats,
                sacred_times: vec![SacredTime {
                    slot: TimeSlotKey::new(6, 9).unwrap(),
                    reason: SacredTimeReason::WeekendMorning,
                    designated_at: t0(),
                }],
                preferences: WorkoutPreferences {
                    favorite_types: vec![WorkoutType::Run, WorkoutType::Strength],
                    preferred_hours: vec![7, 18],
                    typical_duration_minutes: 45,
                },
                patterns: None,
            },
        }
    }

    #[test]
    fn test_state_round_trip() {
        let db = Database::open_memory().unwrap();
        assert!(db.load_state().unwrap().is_none());

        let state = sample_state();
        db.save_state(&state).unwrap();
        let loaded = db.load_state().unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_save_overwrites_previous_state() {
        let db = Database::open_memory().unwrap();
        let mut state = sample_state();
        db.save_state(&state).unwrap();
        state.trust.trust_score = 70.0;
        state.behavioral.sacred_times.clear();
        db.save_state(&state).unwrap();

        let loaded = db.load_state().unwrap().unwrap();
        assert_eq!(loaded.trust.trust_score, 70.0);
        assert!(loaded.behavioral.sacred_times.is_empty());
    }

    #[test]
    fn test_receipt_ttl_pruning() {
        let db = Database::open_memory().unwrap().with_receipt_ttl_days(30);
        let receipt = DecisionReceipt::new(
            crate::receipt::ReceiptType::BlockProposal,
            "propose",
            t0(),
            crate::receipt::ContextSnapshot {
                phase: TrustPhase::Scheduler,
                trust_score: 40.0,
                recovery_score: None,
            },
        );
        db.insert_receipt(&receipt).unwrap();
        assert_eq!(db.receipt_count().unwrap(), 1);

        // Before expiry it survives pruning; after, it does not.
        db.prune_expired(t0() + Duration::days(10), 90).unwrap();
        assert_eq!(db.receipt_count().unwrap(), 1);
        db.prune_expired(t0() + Duration::days(31), 90).unwrap();
        assert_eq!(db.receipt_count().unwrap(), 0);
    }

    #[test]
    fn test_workout_round_trip() {
        let db = Database::open_memory().unwrap();
        let workout = DetectedWorkout::new(
            WorkoutType::Ride,
            t0(),
            t0() + Duration::minutes(60),
            480.0,
        );
        db.insert_workout(&workout).unwrap();
        let loaded = db.load_workouts().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], workout);
    }

    #[test]
    fn test_block_round_trip() {
        let db = Database::open_memory().unwrap();
        let block = TrainingBlock::new(
            WorkoutType::Strength,
            t0(),
            t0() + Duration::minutes(50),
            true,
        );
        db.upsert_block(&block).unwrap();
        let loaded = db.load_blocks().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], block);
    }

    #[test]
    fn test_provenance_round_trip() {
        let db = Database::open_memory().unwrap();
        let entries = vec![ProvenanceEntry {
            metric: "skip.probability".into(),
            version: MetricVersion::new(1, 0),
            input_digest: 42,
            output: 0.7,
            at: t0(),
        }];
        db.save_provenance(&entries).unwrap();
        let loaded = db.load_provenance().unwrap();
        assert_eq!(loaded, entries);
    }
}
