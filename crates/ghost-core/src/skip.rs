//! Rule-based skip prediction.
//!
//! Estimates the probability that a scheduled block will be missed from
//! six weighted features, each added only past an activation threshold.
//! Confidence is derived from data availability, separately from the
//! probability itself. No learning: the model is a fixed rule set behind
//! the [`SkipModel`] seam so a replacement can be plugged in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SkipFeatureWeights;
use crate::events::TrainingBlock;
use crate::patterns::UserBehaviorPatterns;
use crate::phenome::behavior::{TimeSlotKey, TimeSlotStats};
use crate::recovery::RecoveryScore;

/// Prior probability before any feature activates.
const BASELINE_PROBABILITY: f64 = 0.30;

/// Activation thresholds, one per feature.
const SLOT_MISS_ACTIVATION: f64 = 0.5;
const TYPE_ADHERENCE_ACTIVATION: f64 = 0.7;
const DENSITY_ACTIVATION: f64 = 0.6;
const WEEKDAY_MISS_ACTIVATION: f64 = 0.4;

/// Per-day streak reduction and its cap.
const STREAK_STEP: f64 = 0.03;
const STREAK_CAP: f64 = 0.15;

/// What the engine should do about a predicted skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipRecommendation {
    Proceed,
    MonitorClosely,
    ConsiderRescheduling,
    SuggestAlternative,
    ProactiveReschedule,
}

impl SkipRecommendation {
    pub fn from_probability(probability: f64) -> Self {
        if probability < 0.2 {
            Self::Proceed
        } else if probability < 0.4 {
            Self::MonitorClosely
        } else if probability < 0.6 {
            Self::ConsiderRescheduling
        } else if probability < 0.8 {
            Self::SuggestAlternative
        } else {
            Self::ProactiveReschedule
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::MonitorClosely => "monitor_closely",
            Self::ConsiderRescheduling => "consider_rescheduling",
            Self::SuggestAlternative => "suggest_alternative",
            Self::ProactiveReschedule => "proactive_reschedule",
        }
    }
}

/// One feature's contribution to the probability, kept for explainability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub name: String,
    /// Raw feature value before weighting.
    pub raw: f64,
    /// Signed contribution added to the probability.
    pub contribution: f64,
    /// Whether the feature cleared its activation threshold.
    pub active: bool,
}

/// Skip assessment for one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipPrediction {
    pub block_id: String,
    pub probability: f64,
    pub confidence: f64,
    pub recommendation: SkipRecommendation,
    pub contributions: Vec<FeatureContribution>,
    pub computed_at: DateTime<Utc>,
}

/// Everything the predictor may consult for one block. All fields are
/// optional snapshots; absence reduces confidence instead of erroring.
#[derive(Debug, Clone, Copy)]
pub struct SkipContext<'a> {
    pub block: &'a TrainingBlock,
    pub slot_stats: Option<&'a TimeSlotStats>,
    pub patterns: Option<&'a UserBehaviorPatterns>,
    pub recovery: Option<&'a RecoveryScore>,
    /// Share of the schedulable day already busy, 0.0-1.0. Negative when
    /// the calendar could not be read.
    pub calendar_density: f64,
    /// Historical data points backing the prediction.
    pub historical_data_points: usize,
    pub current_streak_days: u32,
}

/// Pluggable prediction seam.
pub trait SkipModel {
    fn predict(&self, ctx: &SkipContext<'_>, now: DateTime<Utc>) -> SkipPrediction;
}

/// The default rule-based predictor.
#[derive(Debug, Clone)]
pub struct SkipPredictor {
    weights: SkipFeatureWeights,
}

impl SkipPredictor {
    pub fn new(weights: SkipFeatureWeights) -> Self {
        Self { weights }
    }

    fn contributions(&self, ctx: &SkipContext<'_>) -> Vec<FeatureContribution> {
        let mut contributions = Vec::with_capacity(6);

        // Time-slot miss rate: pushes the probability up once the slot has
        // missed more than it completed.
        let slot_miss = ctx.slot_stats.map(|s| s.miss_rate()).unwrap_or(0.5);
        let slot_active = slot_miss > SLOT_MISS_ACTIVATION;
        contributions.push(FeatureContribution {
            name: "slot_miss_rate".to_string(),
            raw: slot_miss,
            contribution: if slot_active {
                self.weights.slot_miss_rate * slot_miss
            } else {
                0.0
            },
            active: slot_active,
        });

        // Workout-type adherence: a well-kept modality pulls the
        // probability down.
        let adherence = ctx
            .patterns
            .and_then(|p| p.type_adherence(ctx.block.workout_type));
        let adherence_active = adherence.map_or(false, |a| a > TYPE_ADHERENCE_ACTIVATION);
        contributions.push(FeatureContribution {
            name: "type_adherence".to_string(),
            raw: adherence.unwrap_or(0.0),
            contribution: if adherence_active {
                -self.weights.type_adherence * adherence.unwrap_or(0.0)
            } else {
                0.0
            },
            active: adherence_active,
        });

        // Recovery: the worse the recovery the stronger the push upward.
        let recovery = ctx.recovery.map(|r| r.score).unwrap_or(0.0);
        let recovery_active = ctx.recovery.is_some() && recovery > 0.0;
        contributions.push(FeatureContribution {
            name: "recovery".to_string(),
            raw: recovery,
            contribution: if recovery_active {
                self.weights.recovery * (1.0 - recovery / 100.0) - self.weights.recovery * 0.5
            } else {
                0.0
            },
            active: recovery_active,
        });

        // Calendar density: a packed day crowds workouts out.
        let density = ctx.calendar_density;
        let density_active = density > DENSITY_ACTIVATION;
        contributions.push(FeatureContribution {
            name: "calendar_density".to_string(),
            raw: density,
            contribution: if density_active {
                self.weights.calendar_density * density
            } else {
                0.0
            },
            active: density_active,
        });

        // Day-of-week miss rate.
        let slot = TimeSlotKey::from_datetime(&ctx.block.start_time);
        let weekday_miss = ctx
            .patterns
            .and_then(|p| p.weekday_miss_rate(slot.day_of_week));
        let weekday_active = weekday_miss.map_or(false, |m| m > WEEKDAY_MISS_ACTIVATION);
        contributions.push(FeatureContribution {
            name: "weekday_miss_rate".to_string(),
            raw: weekday_miss.unwrap_or(0.0),
            contribution: if weekday_active {
                self.weights.weekday_miss_rate * weekday_miss.unwrap_or(0.0)
            } else {
                0.0
            },
            active: weekday_active,
        });

        // Streak: momentum protects the block.
        let streak_reduction =
            (ctx.current_streak_days as f64 * STREAK_STEP).min(STREAK_CAP);
        contributions.push(FeatureContribution {
            name: "streak".to_string(),
            raw: ctx.current_streak_days as f64,
            contribution: -streak_reduction,
            active: ctx.current_streak_days > 0,
        });

        contributions
    }

    /// Confidence from data availability: 0.5 base, +0.1 per threshold met.
    fn confidence(ctx: &SkipContext<'_>) -> f64 {
        let mut confidence: f64 = 0.5;
        if ctx.historical_data_points >= 10 {
            confidence += 0.1;
        }
        if ctx.historical_data_points >= 30 {
            confidence += 0.1;
        }
        if ctx.historical_data_points >= 90 {
            confidence += 0.1;
        }
        if ctx.recovery.map_or(false, |r| r.score > 0.0) {
            confidence += 0.1;
        }
        if ctx.calendar_density >= 0.0 {
            confidence += 0.1;
        }
        confidence.min(1.0)
    }
}

impl SkipModel for SkipPredictor {
    fn predict(&self, ctx: &SkipContext<'_>, now: DateTime<Utc>) -> SkipPrediction {
        let contributions = self.contributions(ctx);
        let probability = (BASELINE_PROBABILITY
            + contributions.iter().map(|c| c.contribution).sum::<f64>())
        .clamp(0.0, 1.0);

        SkipPrediction {
            block_id: ctx.block.id.clone(),
            probability,
            confidence: Self::confidence(ctx),
            recommendation: SkipRecommendation::from_probability(probability),
            contributions,
            computed_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WorkoutType;
    use crate::patterns::PatternDetector;
    use crate::phenome::behavior::TimeSlotStats;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 7, 0, 0).unwrap()
    }

    fn block() -> TrainingBlock {
        TrainingBlock::new(WorkoutType::Run, t0(), t0() + Duration::minutes(45), true)
    }

    fn predictor() -> SkipPredictor {
        SkipPredictor::new(SkipFeatureWeights::default())
    }

    fn bare_context(block: &TrainingBlock) -> SkipContext<'_> {
        SkipContext {
            block,
            slot_stats: None,
            patterns: None,
            recovery: None,
            calendar_density: 0.0,
            historical_data_points: 0,
            current_streak_days: 0,
        }
    }

    #[test]
    fn test_no_data_sits_at_baseline() {
        let block = block();
        let prediction = predictor().predict(&bare_context(&block), t0());
        assert!((prediction.probability - BASELINE_PROBABILITY).abs() < 1e-9);
        assert_eq!(prediction.recommendation, SkipRecommendation::MonitorClosely);
        // Base 0.5 plus the readable-calendar threshold.
        assert!((prediction.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_bad_slot_history_raises_probability() {
        let block = block();
        let stats = TimeSlotStats {
            completed: 1,
            missed: 9,
            ..Default::default()
        };
        let mut ctx = bare_context(&block);
        ctx.slot_stats = Some(&stats);
        let prediction = predictor().predict(&ctx, t0());
        assert!(prediction.probability > BASELINE_PROBABILITY + 0.2);
        assert!(prediction
            .contributions
            .iter()
            .any(|c| c.name == "slot_miss_rate" && c.active));
    }

    #[test]
    fn test_streak_lowers_probability_with_cap() {
        let block = block();
        let mut ctx = bare_context(&block);
        ctx.current_streak_days = 2;
        let short = predictor().predict(&ctx, t0());
        ctx.current_streak_days = 30;
        let long = predictor().predict(&ctx, t0());
        assert!(short.probability > long.probability);
        assert!((long.probability - (BASELINE_PROBABILITY - STREAK_CAP)).abs() < 1e-9);
    }

    #[test]
    fn test_good_recovery_pulls_down_bad_recovery_pushes_up() {
        let block = block();
        let good = RecoveryScore {
            score: 90.0,
            ..RecoveryScore::neutral(t0())
        };
        let bad = RecoveryScore {
            score: 15.0,
            ..RecoveryScore::neutral(t0())
        };
        let mut ctx = bare_context(&block);
        ctx.recovery = Some(&good);
        let with_good = predictor().predict(&ctx, t0());
        ctx.recovery = Some(&bad);
        let with_bad = predictor().predict(&ctx, t0());
        assert!(with_good.probability < BASELINE_PROBABILITY);
        assert!(with_bad.probability > BASELINE_PROBABILITY);
    }

    #[test]
    fn test_packed_calendar_activates_density() {
        let block = block();
        let mut ctx = bare_context(&block);
        ctx.calendar_density = 0.85;
        let prediction = predictor().predict(&ctx, t0());
        assert!(prediction.probability > BASELINE_PROBABILITY);
        ctx.calendar_density = 0.4;
        let calm = predictor().predict(&ctx, t0());
        assert!((calm.probability - BASELINE_PROBABILITY).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_thresholds() {
        let block = block();
        let mut ctx = bare_context(&block);
        ctx.calendar_density = -1.0;
        assert!((SkipPredictor::confidence(&ctx) - 0.5).abs() < 1e-9);

        ctx.calendar_density = 0.2;
        ctx.historical_data_points = 95;
        let recovery = RecoveryScore::neutral(t0());
        ctx.recovery = Some(&recovery);
        assert!((SkipPredictor::confidence(&ctx) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_recommendation_bands() {
        assert_eq!(SkipRecommendation::from_probability(0.1), SkipRecommendation::Proceed);
        assert_eq!(
            SkipRecommendation::from_probability(0.2),
            SkipRecommendation::MonitorClosely
        );
        assert_eq!(
            SkipRecommendation::from_probability(0.45),
            SkipRecommendation::ConsiderRescheduling
        );
        assert_eq!(
            SkipRecommendation::from_probability(0.65),
            SkipRecommendation::SuggestAlternative
        );
        assert_eq!(
            SkipRecommendation::from_probability(0.8),
            SkipRecommendation::ProactiveReschedule
        );
    }

    #[test]
    fn test_probability_clamped() {
        let block = block();
        let stats = TimeSlotStats {
            completed: 0,
            missed: 20,
            ..Default::default()
        };
        let bad_recovery = RecoveryScore {
            score: 5.0,
            ..RecoveryScore::neutral(t0())
        };
        // Everything pushing upward at once stays within [0, 1].
        let mut blocks = Vec::new();
        for week in 0..5 {
            let start = t0() + Duration::days(week * 7);
            let mut b = TrainingBlock::new(
                WorkoutType::Run,
                start,
                start + Duration::minutes(45),
                true,
            );
            b.status = crate::events::BlockStatus::Missed;
            blocks.push(b);
        }
        let mut detector = PatternDetector::new(6);
        let patterns = detector.patterns(&blocks, &[], t0() + Duration::days(29)).clone();

        let ctx = SkipContext {
            block: &block,
            slot_stats: Some(&stats),
            patterns: Some(&patterns),
            recovery: Some(&bad_recovery),
            calendar_density: 0.95,
            historical_data_points: 100,
            current_streak_days: 0,
        };
        let prediction = predictor().predict(&ctx, t0());
        assert!((0.0..=1.0).contains(&prediction.probability));
        assert!(prediction.probability > 0.7);
    }
}
