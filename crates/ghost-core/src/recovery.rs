//! Composite recovery scoring.
//!
//! Four normalized factors -- HRV trend, sleep, recent strain, resting-HR
//! trend -- each comparing a recent window (3-7 days) against a 30-day
//! baseline, combined with fixed weights into a 0-100 score. Missing data
//! degrades confidence, never errors.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RecoveryFactorWeights;
use crate::phenome::raw::RawSignalStore;

/// Hours of sleep treated as fully meeting the need.
const SLEEP_NEED_HOURS: f64 = 8.0;

/// Relative change treated as a real trend rather than noise.
const TREND_NOISE_BAND: f64 = 0.03;

/// Direction a factor is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorTrend {
    Improving,
    Stable,
    Declining,
}

/// Whether a factor is helping or hurting recovery right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorImpact {
    Positive,
    Neutral,
    Negative,
}

impl FactorImpact {
    fn from_normalized(value: f64) -> Self {
        if value > 0.6 {
            Self::Positive
        } else if value < 0.4 {
            Self::Negative
        } else {
            Self::Neutral
        }
    }
}

/// One contributing factor of the composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryFactor {
    pub name: String,
    /// Normalized contribution in [0, 1].
    pub normalized: f64,
    pub weight: f64,
    pub impact: FactorImpact,
    pub trend: FactorTrend,
    pub description: String,
    /// False when the factor fell back to neutral for lack of data.
    pub has_data: bool,
}

impl RecoveryFactor {
    fn no_data(name: &'static str, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            normalized: 0.5,
            weight,
            impact: FactorImpact::Neutral,
            trend: FactorTrend::Stable,
            description: format!("{name}: insufficient data"),
            has_data: false,
        }
    }
}

/// Status band of the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    FullyRecovered,
    PartiallyRecovered,
    Fatigued,
    NeedsRest,
}

impl RecoveryStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            Self::FullyRecovered
        } else if score >= 50.0 {
            Self::PartiallyRecovered
        } else if score >= 25.0 {
            Self::Fatigued
        } else {
            Self::NeedsRest
        }
    }

    pub fn action(&self) -> RecoveryAction {
        match self {
            Self::FullyRecovered => RecoveryAction::ProceedAsPlanned,
            Self::PartiallyRecovered => RecoveryAction::ProceedWithCaution,
            Self::Fatigued => RecoveryAction::ReduceIntensity,
            Self::NeedsRest => RecoveryAction::TakeRestDay,
        }
    }

    pub fn intensity(&self) -> IntensitySuggestion {
        match self {
            Self::FullyRecovered => IntensitySuggestion::Full,
            Self::PartiallyRecovered => IntensitySuggestion::Moderate,
            Self::Fatigued => IntensitySuggestion::Light,
            Self::NeedsRest => IntensitySuggestion::RestOnly,
        }
    }
}

/// Fixed recommendation per status band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    ProceedAsPlanned,
    ProceedWithCaution,
    ReduceIntensity,
    TakeRestDay,
}

/// Intensity ceiling suggested for the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensitySuggestion {
    Full,
    Moderate,
    Light,
    RestOnly,
}

/// The composite recovery assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryScore {
    /// Composite score, 0-100.
    pub score: f64,
    pub status: RecoveryStatus,
    pub factors: Vec<RecoveryFactor>,
    /// Share of factors that had real data behind them.
    pub confidence: f64,
    pub computed_at: DateTime<Utc>,
}

impl RecoveryScore {
    /// Neutral assessment used when no signals exist at all.
    pub fn neutral(now: DateTime<Utc>) -> Self {
        Self {
            score: 50.0,
            status: RecoveryStatus::PartiallyRecovered,
            factors: Vec::new(),
            confidence: 0.0,
            computed_at: now,
        }
    }
}

/// Analyzer comparing recent windows against a 30-day baseline.
#[derive(Debug, Clone)]
pub struct RecoveryAnalyzer {
    weights: RecoveryFactorWeights,
    baseline_days: i64,
    hrv_window_days: i64,
    sleep_window_days: i64,
    strain_window_days: i64,
}

impl RecoveryAnalyzer {
    pub fn new(weights: RecoveryFactorWeights) -> Self {
        Self {
            weights,
            baseline_days: 30,
            hrv_window_days: 7,
            sleep_window_days: 3,
            strain_window_days: 3,
        }
    }

    /// Compute the composite recovery score from raw signals.
    pub fn analyze(&self, raw: &RawSignalStore, now: DateTime<Utc>) -> RecoveryScore {
        let factors = vec![
            self.hrv_factor(raw, now),
            self.sleep_factor(raw, now),
            self.strain_factor(raw, now),
            self.resting_hr_factor(raw, now),
        ];

        let score: f64 = factors
            .iter()
            .map(|f| f.normalized * f.weight)
            .sum::<f64>()
            * 100.0;
        let score = score.clamp(0.0, 100.0);
        let with_data = factors.iter().filter(|f| f.has_data).count();
        let confidence = with_data as f64 / factors.len() as f64;

        RecoveryScore {
            score,
            status: RecoveryStatus::from_score(score),
            factors,
            confidence,
            computed_at: now,
        }
    }

    fn hrv_factor(&self, raw: &RawSignalStore, now: DateTime<Utc>) -> RecoveryFactor {
        let baseline: Vec<f64> = raw
            .hrv_since(now - Duration::days(self.baseline_days))
            .iter()
            .map(|r| r.sdnn_ms)
            .collect();
        let recent: Vec<f64> = raw
            .hrv_since(now - Duration::days(self.hrv_window_days))
            .iter()
            .map(|r| r.sdnn_ms)
            .collect();
        let (Some(baseline_mean), Some(recent_mean)) = (mean(&baseline), mean(&recent)) else {
            return RecoveryFactor::no_data("hrv_trend", self.weights.hrv_trend);
        };
        if baseline_mean <= 0.0 {
            return RecoveryFactor::no_data("hrv_trend", self.weights.hrv_trend);
        }

        // Higher HRV than baseline reads as better recovery.
        let ratio = recent_mean / baseline_mean;
        let normalized = (0.5 + (ratio - 1.0) * 2.5).clamp(0.0, 1.0);
        RecoveryFactor {
            name: "hrv_trend".to_string(),
            normalized,
            weight: self.weights.hrv_trend,
            impact: FactorImpact::from_normalized(normalized),
            trend: trend_from_ratio(ratio),
            description: format!(
                "7-day HRV {recent_mean:.0}ms vs 30-day baseline {baseline_mean:.0}ms"
            ),
            has_data: true,
        }
    }

    fn sleep_factor(&self, raw: &RawSignalStore, now: DateTime<Utc>) -> RecoveryFactor {
        let today = now.date_naive();
        let baseline: Vec<f64> = raw
            .sleep_since(today - Duration::days(self.baseline_days))
            .iter()
            .map(|r| r.asleep_hours)
            .collect();
        let recent: Vec<f64> = raw
            .sleep_since(today - Duration::days(self.sleep_window_days))
            .iter()
            .map(|r| r.asleep_hours)
            .collect();
        let (Some(baseline_mean), Some(recent_mean)) = (mean(&baseline), mean(&recent)) else {
            return RecoveryFactor::no_data("sleep", self.weights.sleep);
        };

        let normalized = (recent_mean / SLEEP_NEED_HOURS).clamp(0.0, 1.0);
        let ratio = if baseline_mean > 0.0 {
            recent_mean / baseline_mean
        } else {
            1.0
        };
        RecoveryFactor {
            name: "sleep".to_string(),
            normalized,
            weight: self.weights.sleep,
            impact: FactorImpact::from_normalized(normalized),
            trend: trend_from_ratio(ratio),
            description: format!("3-night sleep average {recent_mean:.1}h"),
            has_data: true,
        }
    }

    fn strain_factor(&self, raw: &RawSignalStore, now: DateTime<Utc>) -> RecoveryFactor {
        let baseline_workouts = raw.workouts_since(now - Duration::days(self.baseline_days));
        if baseline_workouts.is_empty() {
            return RecoveryFactor::no_data("recent_strain", self.weights.recent_strain);
        }
        let baseline_daily: f64 = baseline_workouts
            .iter()
            .map(|w| w.active_calories)
            .sum::<f64>()
            / self.baseline_days as f64;
        let recent_daily: f64 = raw
            .workouts_since(now - Duration::days(self.strain_window_days))
            .iter()
            .map(|w| w.active_calories)
            .sum::<f64>()
            / self.strain_window_days as f64;
        if baseline_daily <= 0.0 {
            return RecoveryFactor::no_data("recent_strain", self.weights.recent_strain);
        }

        // Inverted: training well above the habitual load lowers the factor,
        // an easy stretch raises it.
        let ratio = recent_daily / baseline_daily;
        let normalized = (1.25 - 0.5 * ratio).clamp(0.0, 1.0);
        RecoveryFactor {
            name: "recent_strain".to_string(),
            normalized,
            weight: self.weights.recent_strain,
            impact: FactorImpact::from_normalized(normalized),
            // A rising load reads as a declining recovery trend.
            trend: trend_from_ratio(2.0 - ratio),
            description: format!(
                "3-day load {recent_daily:.0} kcal/day vs baseline {baseline_daily:.0}"
            ),
            has_data: true,
        }
    }

    fn resting_hr_factor(&self, raw: &RawSignalStore, now: DateTime<Utc>) -> RecoveryFactor {
        let baseline: Vec<f64> = raw
            .resting_hr_since(now - Duration::days(self.baseline_days))
            .iter()
            .map(|r| r.bpm)
            .collect();
        let recent: Vec<f64> = raw
            .resting_hr_since(now - Duration::days(self.hrv_window_days))
            .iter()
            .map(|r| r.bpm)
            .collect();
        let (Some(baseline_mean), Some(recent_mean)) = (mean(&baseline), mean(&recent)) else {
            return RecoveryFactor::no_data("resting_hr_trend", self.weights.resting_hr_trend);
        };
        if baseline_mean <= 0.0 {
            return RecoveryFactor::no_data("resting_hr_trend", self.weights.resting_hr_trend);
        }

        // An elevated resting HR reads as incomplete recovery.
        let relative_change = (recent_mean - baseline_mean) / baseline_mean;
        let normalized = (0.5 - relative_change * 5.0).clamp(0.0, 1.0);
        RecoveryFactor {
            name: "resting_hr_trend".to_string(),
            normalized,
            weight: self.weights.resting_hr_trend,
            impact: FactorImpact::from_normalized(normalized),
            trend: trend_from_ratio(1.0 - relative_change),
            description: format!(
                "7-day resting HR {recent_mean:.0}bpm vs baseline {baseline_mean:.0}bpm"
            ),
            has_data: true,
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn trend_from_ratio(ratio: f64) -> FactorTrend {
    if ratio > 1.0 + TREND_NOISE_BAND {
        FactorTrend::Improving
    } else if ratio < 1.0 - TREND_NOISE_BAND {
        FactorTrend::Declining
    } else {
        FactorTrend::Stable
    }
}
