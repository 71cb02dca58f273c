//! Engine configuration.
//!
//! All tunable constants live in one explicit structure. Weight tables are
//! validated at engine construction; a table that does not satisfy its
//! structural constraints (sums, signs) is fatal at startup and nowhere
//! else. Configuration is serialized to/from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Signed base weights for trust attribution, one per event kind.
///
/// Signs and relative magnitudes are contractual: positive events must stay
/// positive, penalties must stay negative, and deleting an auto-scheduled
/// block must cost more than deleting a manual one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseWeights {
    #[serde(default = "default_workout_completed")]
    pub workout_completed: f64,
    #[serde(default = "default_block_accepted")]
    pub block_accepted: f64,
    #[serde(default = "default_proposal_accepted")]
    pub proposal_accepted: f64,
    #[serde(default = "default_triage_responded")]
    pub triage_responded: f64,
    #[serde(default = "default_app_opened")]
    pub app_opened: f64,
    #[serde(default = "default_block_missed")]
    pub block_missed: f64,
    #[serde(default = "default_proposal_rejected")]
    pub proposal_rejected: f64,
    #[serde(default = "default_block_deleted_manual")]
    pub block_deleted_manual: f64,
    #[serde(default = "default_block_deleted_auto")]
    pub block_deleted_auto: f64,
    #[serde(default = "default_permission_revoked")]
    pub permission_revoked: f64,
}

fn default_workout_completed() -> f64 {
    3.0
}
fn default_block_accepted() -> f64 {
    1.5
}
fn default_proposal_accepted() -> f64 {
    2.0
}
fn default_triage_responded() -> f64 {
    0.8
}
fn default_app_opened() -> f64 {
    0.1
}
fn default_block_missed() -> f64 {
    -2.0
}
fn default_proposal_rejected() -> f64 {
    -1.0
}
fn default_block_deleted_manual() -> f64 {
    -2.5
}
fn default_block_deleted_auto() -> f64 {
    -5.0
}
fn default_permission_revoked() -> f64 {
    -8.0
}

impl Default for BaseWeights {
    fn default() -> Self {
        Self {
            workout_completed: default_workout_completed(),
            block_accepted: default_block_accepted(),
            proposal_accepted: default_proposal_accepted(),
            triage_responded: default_triage_responded(),
            app_opened: default_app_opened(),
            block_missed: default_block_missed(),
            proposal_rejected: default_proposal_rejected(),
            block_deleted_manual: default_block_deleted_manual(),
            block_deleted_auto: default_block_deleted_auto(),
            permission_revoked: default_permission_revoked(),
        }
    }
}

impl BaseWeights {
    /// Validate signs and relative magnitudes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positives = [
            ("workout_completed", self.workout_completed),
            ("block_accepted", self.block_accepted),
            ("proposal_accepted", self.proposal_accepted),
            ("triage_responded", self.triage_responded),
            ("app_opened", self.app_opened),
        ];
        for (name, w) in positives {
            if w <= 0.0 {
                return Err(ConfigError::InvalidWeights {
                    table: "base_weights".into(),
                    message: format!("'{name}' must be positive, got {w}"),
                });
            }
        }
        let negatives = [
            ("block_missed", self.block_missed),
            ("proposal_rejected", self.proposal_rejected),
            ("block_deleted_manual", self.block_deleted_manual),
            ("block_deleted_auto", self.block_deleted_auto),
            ("permission_revoked", self.permission_revoked),
        ];
        for (name, w) in negatives {
            if w >= 0.0 {
                return Err(ConfigError::InvalidWeights {
                    table: "base_weights".into(),
                    message: format!("'{name}' must be negative, got {w}"),
                });
            }
        }
        if self.block_deleted_auto >= self.block_deleted_manual {
            return Err(ConfigError::InvalidWeights {
                table: "base_weights".into(),
                message: "deleting an auto-scheduled block must cost more than a manual one".into(),
            });
        }
        Ok(())
    }
}

/// Feature weights for the skip predictor. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkipFeatureWeights {
    /// Time-slot miss rate (higher miss -> higher skip)
    pub slot_miss_rate: f64,
    /// Workout-type adherence (higher adherence -> lower skip)
    pub type_adherence: f64,
    /// Recovery score (higher recovery -> lower skip)
    pub recovery: f64,
    /// Calendar density (busier day -> higher skip)
    pub calendar_density: f64,
    /// Day-of-week miss rate
    pub weekday_miss_rate: f64,
    /// Streak length (each day lowers skip, capped)
    pub streak: f64,
}

impl Default for SkipFeatureWeights {
    fn default() -> Self {
        Self {
            slot_miss_rate: 0.30,
            type_adherence: 0.15,
            recovery: 0.20,
            calendar_density: 0.15,
            weekday_miss_rate: 0.10,
            streak: 0.10,
        }
    }
}

impl SkipFeatureWeights {
    pub fn sum(&self) -> f64 {
        self.slot_miss_rate
            + self.type_adherence
            + self.recovery
            + self.calendar_density
            + self.weekday_miss_rate
            + self.streak
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_unit_sum("skip_feature_weights", self.sum())?;
        validate_non_negative(
            "skip_feature_weights",
            &[
                ("slot_miss_rate", self.slot_miss_rate),
                ("type_adherence", self.type_adherence),
                ("recovery", self.recovery),
                ("calendar_density", self.calendar_density),
                ("weekday_miss_rate", self.weekday_miss_rate),
                ("streak", self.streak),
            ],
        )
    }
}

/// Scoring weights for the optimal window finder. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowFactorWeights {
    /// Historical completion success at the time slot
    pub historical_success: f64,
    /// Alignment with the user's preferred period of day
    pub preference_alignment: f64,
    /// Excess time versus the 30-minute ideal buffer
    pub buffer_quality: f64,
    /// Per-hour energy curve
    pub energy: f64,
    /// Excess time bucketed into flexibility tiers
    pub flexibility: f64,
}

impl Default for WindowFactorWeights {
    fn default() -> Self {
        Self {
            historical_success: 0.30,
            preference_alignment: 0.25,
            buffer_quality: 0.20,
            energy: 0.15,
            flexibility: 0.10,
        }
    }
}

impl WindowFactorWeights {
    pub fn sum(&self) -> f64 {
        self.historical_success
            + self.preference_alignment
            + self.buffer_quality
            + self.energy
            + self.flexibility
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_unit_sum("window_factor_weights", self.sum())?;
        validate_non_negative(
            "window_factor_weights",
            &[
                ("historical_success", self.historical_success),
                ("preference_alignment", self.preference_alignment),
                ("buffer_quality", self.buffer_quality),
                ("energy", self.energy),
                ("flexibility", self.flexibility),
            ],
        )
    }
}

/// Factor weights for the composite recovery score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryFactorWeights {
    pub hrv_trend: f64,
    pub sleep: f64,
    pub recent_strain: f64,
    pub resting_hr_trend: f64,
}

impl Default for RecoveryFactorWeights {
    fn default() -> Self {
        Self {
            hrv_trend: 0.30,
            sleep: 0.30,
            recent_strain: 0.25,
            resting_hr_trend: 0.15,
        }
    }
}

impl RecoveryFactorWeights {
    pub fn sum(&self) -> f64 {
        self.hrv_trend + self.sleep + self.recent_strain + self.resting_hr_trend
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_unit_sum("recovery_factor_weights", self.sum())?;
        validate_non_negative(
            "recovery_factor_weights",
            &[
                ("hrv_trend", self.hrv_trend),
                ("sleep", self.sleep),
                ("recent_strain", self.recent_strain),
                ("resting_hr_trend", self.resting_hr_trend),
            ],
        )
    }
}

fn validate_unit_sum(table: &str, sum: f64) -> Result<(), ConfigError> {
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ConfigError::InvalidWeights {
            table: table.into(),
            message: format!("weights must sum to 1.0, got {sum}"),
        });
    }
    Ok(())
}

fn validate_non_negative(table: &str, weights: &[(&str, f64)]) -> Result<(), ConfigError> {
    for (name, w) in weights {
        if *w < 0.0 {
            return Err(ConfigError::InvalidWeights {
                table: table.into(),
                message: format!("'{name}' must be non-negative, got {w}"),
            });
        }
    }
    Ok(())
}

/// Engine configuration.
///
/// Serialized to/from TOML. Every field has a default so a partial file
/// loads cleanly; `validate()` runs at engine construction and is the only
/// place a bad configuration is fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GhostConfig {
    /// Maximum attempts per orchestrator cycle.
    #[serde(default = "default_max_retries")]
    pub max_retries_per_cycle: u32,
    /// Wall-clock budget for one cycle attempt, in seconds.
    #[serde(default = "default_cycle_budget")]
    pub cycle_budget_seconds: u64,
    /// Smallest calendar gap worth considering, in minutes.
    #[serde(default = "default_min_window")]
    pub min_window_duration_minutes: i64,
    /// Buffer required before a proposed workout, in minutes.
    #[serde(default = "default_buffer")]
    pub buffer_before_event_minutes: i64,
    /// Buffer required after a proposed workout, in minutes.
    #[serde(default = "default_buffer")]
    pub buffer_after_event_minutes: i64,
    /// First hour of the schedulable day (0-23).
    #[serde(default = "default_day_start")]
    pub day_start_hour: u32,
    /// Hour the schedulable day ends (exclusive, 1-24).
    #[serde(default = "default_day_end")]
    pub day_end_hour: u32,
    /// Raw-signal retention horizon, in days.
    #[serde(default = "default_raw_retention")]
    pub raw_signal_retention_days: i64,
    /// Derived-state retention horizon, in days.
    #[serde(default = "default_derived_retention")]
    pub derived_state_retention_days: i64,
    /// Pattern cache time-to-live, in hours.
    #[serde(default = "default_pattern_cache")]
    pub pattern_cache_hours: i64,
    /// Consecutive deletions that trip the safety breaker.
    #[serde(default = "default_breaker_threshold")]
    pub safety_breaker_consecutive_threshold: u32,
    #[serde(default)]
    pub base_weights: BaseWeights,
    #[serde(default)]
    pub feature_weights: SkipFeatureWeights,
    #[serde(default)]
    pub window_weights: WindowFactorWeights,
    #[serde(default)]
    pub recovery_weights: RecoveryFactorWeights,
}

fn default_max_retries() -> u32 {
    2
}
fn default_cycle_budget() -> u64 {
    30
}
fn default_min_window() -> i64 {
    30
}
fn default_buffer() -> i64 {
    15
}
fn default_day_start() -> u32 {
    6
}
fn default_day_end() -> u32 {
    22
}
fn default_raw_retention() -> i64 {
    90
}
fn default_derived_retention() -> i64 {
    30
}
fn default_pattern_cache() -> i64 {
    6
}
fn default_breaker_threshold() -> u32 {
    3
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            max_retries_per_cycle: default_max_retries(),
            cycle_budget_seconds: default_cycle_budget(),
            min_window_duration_minutes: default_min_window(),
            buffer_before_event_minutes: default_buffer(),
            buffer_after_event_minutes: default_buffer(),
            day_start_hour: default_day_start(),
            day_end_hour: default_day_end(),
            raw_signal_retention_days: default_raw_retention(),
            derived_state_retention_days: default_derived_retention(),
            pattern_cache_hours: default_pattern_cache(),
            safety_breaker_consecutive_threshold: default_breaker_threshold(),
            base_weights: BaseWeights::default(),
            feature_weights: SkipFeatureWeights::default(),
            window_weights: WindowFactorWeights::default(),
            recovery_weights: RecoveryFactorWeights::default(),
        }
    }
}

impl GhostConfig {
    /// Validate the full configuration. Fatal at engine construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_weights.validate()?;
        self.feature_weights.validate()?;
        self.window_weights.validate()?;
        self.recovery_weights.validate()?;

        if self.day_start_hour >= self.day_end_hour || self.day_end_hour > 24 {
            return Err(ConfigError::InvalidValue {
                key: "day_start_hour/day_end_hour".into(),
                message: format!(
                    "day window {}..{} is not a valid range",
                    self.day_start_hour, self.day_end_hour
                ),
            });
        }
        if self.min_window_duration_minutes <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "min_window_duration_minutes".into(),
                message: "must be positive".into(),
            });
        }
        if self.buffer_before_event_minutes < 0 || self.buffer_after_event_minutes < 0 {
            return Err(ConfigError::InvalidValue {
                key: "buffer_before_event_minutes/buffer_after_event_minutes".into(),
                message: "buffers must be non-negative".into(),
            });
        }
        if self.raw_signal_retention_days <= 0 || self.derived_state_retention_days <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "retention".into(),
                message: "retention horizons must be positive".into(),
            });
        }
        if self.safety_breaker_consecutive_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                key: "safety_breaker_consecutive_threshold".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.max_retries_per_cycle == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_retries_per_cycle".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Load from a TOML file, falling back to defaults for missing fields.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save as TOML.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, raw).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}
