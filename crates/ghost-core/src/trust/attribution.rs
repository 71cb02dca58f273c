//! Trust attribution: event to score delta.
//!
//! Pure arithmetic, no I/O, no clock reads. Given the same event, phase,
//! and trust score the returned delta is byte-identical across runs.
//!
//! `delta = base_weight(event) * phase_modifier * confidence_modifier
//!          * diminishing_factor`, with the final magnitude clamped to 20.

use crate::config::BaseWeights;
use crate::events::TrustEvent;
use crate::trust::phase::TrustPhase;

/// Hard cap on the magnitude of any single attributed delta.
pub const MAX_DELTA_MAGNITUDE: f64 = 20.0;

/// Reference duration for a full-credit workout, in minutes.
const FULL_CREDIT_DURATION_MIN: f64 = 45.0;

/// Pure function mapping `(event, phase, trust_score)` to a score delta.
#[derive(Debug, Clone)]
pub struct AttributionEngine {
    weights: BaseWeights,
}

impl AttributionEngine {
    pub fn new(weights: BaseWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &BaseWeights {
        &self.weights
    }

    /// The signed base weight for an event, before modifiers.
    pub fn base_weight(&self, event: &TrustEvent) -> f64 {
        match event {
            TrustEvent::WorkoutCompleted { .. } => self.weights.workout_completed,
            TrustEvent::BlockAccepted { .. } => self.weights.block_accepted,
            TrustEvent::ProposalAccepted { .. } => self.weights.proposal_accepted,
            TrustEvent::TriageResponded { .. } => self.weights.triage_responded,
            TrustEvent::AppOpened { .. } => self.weights.app_opened,
            TrustEvent::BlockMissed { .. } => self.weights.block_missed,
            TrustEvent::ProposalRejected { .. } => self.weights.proposal_rejected,
            TrustEvent::BlockDeleted { block, .. } => {
                if block.was_auto_scheduled {
                    self.weights.block_deleted_auto
                } else {
                    self.weights.block_deleted_manual
                }
            }
            TrustEvent::PermissionRevoked { .. } => self.weights.permission_revoked,
        }
    }

    /// Positive events are amplified in lower phases: trust is easier to
    /// earn when the system has little. Penalties are phase-neutral.
    pub fn phase_modifier(phase: TrustPhase, base_weight: f64) -> f64 {
        if base_weight <= 0.0 {
            return 1.0;
        }
        match phase {
            TrustPhase::Observer => 1.5,
            TrustPhase::Scheduler => 1.25,
            TrustPhase::AutoScheduler => 1.1,
            TrustPhase::Transformer => 1.0,
            TrustPhase::FullGhost => 0.8,
        }
    }

    /// Event-specific confidence modifier.
    ///
    /// A longer completed workout earns more (capped at 1.5x); a recognized
    /// excuse shrinks a missed-block penalty down to its excuse weight.
    fn confidence_modifier(event: &TrustEvent) -> f64 {
        match event {
            TrustEvent::WorkoutCompleted { workout, .. } => {
                (workout.duration_minutes / FULL_CREDIT_DURATION_MIN).min(1.5)
            }
            TrustEvent::BlockMissed { reason, .. } => reason.excuse_weight(),
            _ => 1.0,
        }
    }

    /// Diminishing returns: gains shrink as trust grows, losses grow as
    /// trust grows. High-trust users have more to lose.
    pub fn diminishing_factor(trust_score: f64, base_weight: f64) -> f64 {
        let score = trust_score.clamp(0.0, 100.0);
        if base_weight >= 0.0 {
            (100.0 - score) / 100.0
        } else {
            1.0 + score / 100.0
        }
    }

    /// Compute the attributed delta for an event at the given state.
    pub fn delta(&self, event: &TrustEvent, phase: TrustPhase, trust_score: f64) -> f64 {
        let base = self.base_weight(event);
        let raw = base
            * Self::phase_modifier(phase, base)
            * Self::confidence_modifier(event)
            * Self::diminishing_factor(trust_score, base);
        raw.clamp(-MAX_DELTA_MAGNITUDE, MAX_DELTA_MAGNITUDE)
    }

    /// Streak bonus for consecutive workout days. Applied at a separate
    /// call-site on `WorkoutCompleted`, scaled by the positive diminishing
    /// factor so a long streak cannot blow past the score ceiling.
    pub fn streak_bonus(consecutive_days: u32) -> f64 {
        if consecutive_days <= 2 {
            0.0
        } else {
            (0.5 * consecutive_days as f64).min(5.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DetectedWorkout, MissedReason, TrainingBlock, WorkoutType};
    use chrono::{Duration, TimeZone, Utc};

    fn engine() -> AttributionEngine {
        AttributionEngine::new(BaseWeights::default())
    }

    fn fixed_time() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 7, 0, 0).unwrap()
    }

    fn workout_event(duration_min: i64) -> TrustEvent {
        let start = fixed_time();
        TrustEvent::WorkoutCompleted {
            workout: DetectedWorkout::new(
                WorkoutType::Run,
                start,
                start + Duration::minutes(duration_min),
                300.0,
            ),
            at: start + Duration::minutes(duration_min),
        }
    }

    fn deleted_event(auto: bool) -> TrustEvent {
        let start = fixed_time();
        let mut block =
            TrainingBlock::new(WorkoutType::Strength, start, start + Duration::minutes(45), auto);
        block.was_auto_scheduled = auto;
        TrustEvent::BlockDeleted { block, at: start }
    }

    fn missed_event(reason: MissedReason) -> TrustEvent {
        let start = fixed_time();
        let block =
            TrainingBlock::new(WorkoutType::Strength, start, start + Duration::minutes(45), true);
        TrustEvent::BlockMissed { block, reason, at: start }
    }

    #[test]
    fn test_determinism() {
        let e = engine();
        let event = workout_event(45);
        let a = e.delta(&event, TrustPhase::Scheduler, 42.5);
        let b = e.delta(&event, TrustPhase::Scheduler, 42.5);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_positive_amplified_in_low_phases() {
        let e = engine();
        let event = workout_event(45);
        let low = e.delta(&event, TrustPhase::Observer, 50.0);
        let high = e.delta(&event, TrustPhase::FullGhost, 50.0);
        assert!(low > high);
    }

    #[test]
    fn test_penalties_phase_neutral() {
        let e = engine();
        let event = deleted_event(true);
        let a = e.delta(&event, TrustPhase::Observer, 50.0);
        let b = e.delta(&event, TrustPhase::FullGhost, 50.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_auto_delete_costs_more_than_manual() {
        let e = engine();
        let auto = e.delta(&deleted_event(true), TrustPhase::AutoScheduler, 60.0);
        let manual = e.delta(&deleted_event(false), TrustPhase::AutoScheduler, 60.0);
        assert!(auto < manual && manual < 0.0);
    }

    #[test]
    fn test_diminishing_returns() {
        let e = engine();
        let event = workout_event(45);
        let at_50 = e.delta(&event, TrustPhase::Transformer, 50.0);
        let at_95 = e.delta(&event, TrustPhase::Transformer, 95.0);
        assert!(at_50 > at_95);
        assert!(at_95 > 0.0);
    }

    #[test]
    fn test_high_trust_has_more_to_lose() {
        let e = engine();
        let event = deleted_event(true);
        let at_20 = e.delta(&event, TrustPhase::Scheduler, 20.0);
        let at_90 = e.delta(&event, TrustPhase::Scheduler, 90.0);
        assert!(at_90 < at_20);
    }

    #[test]
    fn test_excuse_ordering() {
        // Every recognized excuse must beat NoReason, at any phase/score.
        let e = engine();
        for phase in TrustPhase::ALL {
            for score in [0.0, 35.0, 80.0, 100.0] {
                let full = e.delta(&missed_event(MissedReason::NoReason), phase, score);
                for reason in MissedReason::all() {
                    if reason == MissedReason::NoReason {
                        continue;
                    }
                    let excused = e.delta(&missed_event(reason), phase, score);
                    assert!(
                        excused >= full,
                        "{reason:?} at {phase:?}/{score}: {excused} < {full}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_illness_keeps_under_a_fifth_of_full_penalty() {
        let e = engine();
        let illness = e.delta(&missed_event(MissedReason::Illness), TrustPhase::FullGhost, 80.0);
        let full = e.delta(&missed_event(MissedReason::NoReason), TrustPhase::FullGhost, 80.0);
        assert!(illness.abs() < full.abs() * 0.2);
    }

    #[test]
    fn test_duration_caps_at_one_and_a_half() {
        let e = engine();
        // Both exceed the 67.5-minute boundary, so both hit the 1.5x cap.
        let long = e.delta(&workout_event(180), TrustPhase::Observer, 0.0);
        let capped = e.delta(&workout_event(68), TrustPhase::Observer, 0.0);
        assert_eq!(long, capped);
    }

    #[test]
    fn test_magnitude_bounded() {
        let e = engine();
        let events = [
            workout_event(300),
            deleted_event(true),
            missed_event(MissedReason::NoReason),
            TrustEvent::PermissionRevoked {
                scope: "calendar".into(),
                at: fixed_time(),
            },
        ];
        for event in &events {
            for phase in TrustPhase::ALL {
                for score in [0.0, 50.0, 100.0] {
                    let d = e.delta(event, phase, score);
                    assert!(d.abs() <= MAX_DELTA_MAGNITUDE);
                }
            }
        }
    }

    #[test]
    fn test_streak_bonus_ramp_and_cap() {
        assert_eq!(AttributionEngine::streak_bonus(0), 0.0);
        assert_eq!(AttributionEngine::streak_bonus(2), 0.0);
        assert_eq!(AttributionEngine::streak_bonus(3), 1.5);
        assert_eq!(AttributionEngine::streak_bonus(7), 3.5);
        assert_eq!(AttributionEngine::streak_bonus(10), 5.0);
        assert_eq!(AttributionEngine::streak_bonus(40), 5.0);
    }
}
