//! Database schema migrations.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current version.

use indoc::indoc;
use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations.
///
/// # Errors
/// Returns an error if a migration statement fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })?
        .unwrap_or(0);
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("INSERT OR REPLACE INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Core tables: trust state, behavioral memory, raw signals, derived
/// state.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(indoc! {"
        CREATE TABLE IF NOT EXISTS trust_state (
            id                        INTEGER PRIMARY KEY CHECK (id = 1),
            phase                     TEXT NOT NULL,
            trust_score               REAL NOT NULL,
            consecutive_deletes       INTEGER NOT NULL,
            consecutive_workout_days  INTEGER NOT NULL,
            last_workout_day          TEXT,
            updated_at                TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS slot_stats (
            day_of_week     INTEGER NOT NULL,
            hour_of_day     INTEGER NOT NULL,
            completed       INTEGER NOT NULL DEFAULT 0,
            missed          INTEGER NOT NULL DEFAULT 0,
            penalties       INTEGER NOT NULL DEFAULT 0,
            last_completed  TEXT,
            last_missed     TEXT,
            PRIMARY KEY (day_of_week, hour_of_day)
        );

        CREATE TABLE IF NOT EXISTS sacred_times (
            day_of_week    INTEGER NOT NULL,
            hour_of_day    INTEGER NOT NULL,
            reason         TEXT NOT NULL,
            designated_at  TEXT NOT NULL,
            PRIMARY KEY (day_of_week, hour_of_day)
        );

        CREATE TABLE IF NOT EXISTS preferences (
            id                        INTEGER PRIMARY KEY CHECK (id = 1),
            typical_duration_minutes  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS preference_types (
            workout_type  TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS preference_hours (
            hour      INTEGER PRIMARY KEY,
            position  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sleep_data (
            id            TEXT PRIMARY KEY,
            night_of      TEXT NOT NULL,
            asleep_hours  REAL NOT NULL,
            efficiency    REAL
        );

        CREATE TABLE IF NOT EXISTS hrv_data (
            id       TEXT PRIMARY KEY,
            at       TEXT NOT NULL,
            sdnn_ms  REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS resting_hr_data (
            id   TEXT PRIMARY KEY,
            at   TEXT NOT NULL,
            bpm  REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workouts (
            id                  TEXT PRIMARY KEY,
            workout_type        TEXT NOT NULL,
            start_date          TEXT NOT NULL,
            end_date            TEXT NOT NULL,
            duration_minutes    REAL NOT NULL,
            active_calories     REAL NOT NULL,
            average_heart_rate  REAL,
            source              TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS training_blocks (
            id                 TEXT PRIMARY KEY,
            calendar_event_id  TEXT,
            workout_type       TEXT NOT NULL,
            start_time         TEXT NOT NULL,
            end_time           TEXT NOT NULL,
            was_auto_scheduled INTEGER NOT NULL,
            status             TEXT NOT NULL,
            generated_workout  TEXT
        );

        CREATE TABLE IF NOT EXISTS morning_states (
            date               TEXT PRIMARY KEY,
            recovery_score     REAL NOT NULL,
            recovery_status    TEXT NOT NULL,
            high_risk_blocks   INTEGER NOT NULL,
            proposals_emitted  INTEGER NOT NULL,
            computed_at        TEXT NOT NULL
        );
    "})?;
    set_schema_version(conn, 1)
}

/// Audit tables: receipts with TTL and the metric provenance log.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(indoc! {"
        CREATE TABLE IF NOT EXISTS receipts (
            id            TEXT PRIMARY KEY,
            timestamp     TEXT NOT NULL,
            receipt_type  TEXT NOT NULL,
            confidence    REAL NOT NULL,
            decision      TEXT NOT NULL,
            payload       TEXT NOT NULL,
            expires_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_receipts_expires ON receipts (expires_at);

        CREATE TABLE IF NOT EXISTS metric_provenance (
            seq           INTEGER PRIMARY KEY AUTOINCREMENT,
            metric        TEXT NOT NULL,
            version       TEXT NOT NULL,
            input_digest  TEXT NOT NULL,
            output        REAL NOT NULL,
            at            TEXT NOT NULL
        );
    "})?;
    set_schema_version(conn, 2)
}
