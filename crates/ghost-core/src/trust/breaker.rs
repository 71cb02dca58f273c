//! Safety breaker: consecutive-deletion detector.
//!
//! Three consecutive `BlockDeleted` events without an intervening positive
//! reset force an immediate single-phase regression. The counter never
//! exceeds threshold - 1 between events; firing resets it to zero.

use serde::{Deserialize, Serialize};

use crate::events::TrustEvent;
use crate::trust::phase::TrustPhase;

/// What the breaker decided for an observed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerAction {
    /// Event is irrelevant to the breaker.
    None,
    /// A positive event zeroed the counter.
    Reset,
    /// A deletion was counted but the threshold was not reached.
    Counted,
    /// Threshold reached: regress one phase now. Counter is already zero.
    Fired,
}

/// Consecutive-deletion counter with one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyBreaker {
    consecutive_deletes: u32,
    threshold: u32,
}

impl SafetyBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_deletes: 0,
            threshold: threshold.max(1),
        }
    }

    /// Restore from a persisted counter value.
    pub fn with_count(threshold: u32, consecutive_deletes: u32) -> Self {
        let mut breaker = Self::new(threshold);
        breaker.consecutive_deletes = consecutive_deletes.min(breaker.threshold - 1);
        breaker
    }

    pub fn consecutive_deletes(&self) -> u32 {
        self.consecutive_deletes
    }

    /// Observe an event. Runs before ordinary delta application so a fired
    /// regression is seen atomically with the triggering event.
    pub fn observe(&mut self, event: &TrustEvent) -> BreakerAction {
        match event {
            TrustEvent::BlockDeleted { .. } => {
                self.consecutive_deletes += 1;
                if self.consecutive_deletes >= self.threshold {
                    self.consecutive_deletes = 0;
                    BreakerAction::Fired
                } else {
                    BreakerAction::Counted
                }
            }
            TrustEvent::WorkoutCompleted { .. }
            | TrustEvent::ProposalAccepted { .. }
            | TrustEvent::BlockAccepted { .. } => {
                if self.consecutive_deletes > 0 {
                    self.consecutive_deletes = 0;
                    BreakerAction::Reset
                } else {
                    BreakerAction::None
                }
            }
            _ => BreakerAction::None,
        }
    }

    /// Where a fired breaker sends the given phase. Cannot drop below
    /// `Observer`.
    pub fn downgrade_target(phase: TrustPhase) -> TrustPhase {
        phase.previous().unwrap_or(TrustPhase::Observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DetectedWorkout, TrainingBlock, WorkoutType};
    use chrono::{Duration, Utc};

    fn delete_event() -> TrustEvent {
        let start = Utc::now();
        TrustEvent::BlockDeleted {
            block: TrainingBlock::new(WorkoutType::Run, start, start + Duration::minutes(45), true),
            at: start,
        }
    }

    fn workout_event() -> TrustEvent {
        let start = Utc::now();
        TrustEvent::WorkoutCompleted {
            workout: DetectedWorkout::new(
                WorkoutType::Run,
                start,
                start + Duration::minutes(45),
                300.0,
            ),
            at: start,
        }
    }

    #[test]
    fn test_fires_on_third_consecutive_delete() {
        let mut breaker = SafetyBreaker::new(3);
        assert_eq!(breaker.observe(&delete_event()), BreakerAction::Counted);
        assert_eq!(breaker.observe(&delete_event()), BreakerAction::Counted);
        assert_eq!(breaker.observe(&delete_event()), BreakerAction::Fired);
        assert_eq!(breaker.consecutive_deletes(), 0);
    }

    #[test]
    fn test_nine_deletes_fire_three_times() {
        let mut breaker = SafetyBreaker::new(3);
        let mut fired = 0;
        for _ in 0..9 {
            if breaker.observe(&delete_event()) == BreakerAction::Fired {
                fired += 1;
            }
        }
        assert_eq!(fired, 3);
        assert_eq!(breaker.consecutive_deletes(), 0);
    }

    #[test]
    fn test_positive_event_resets_counter() {
        let mut breaker = SafetyBreaker::new(3);
        breaker.observe(&delete_event());
        breaker.observe(&delete_event());
        assert_eq!(breaker.observe(&workout_event()), BreakerAction::Reset);
        breaker.observe(&delete_event());
        assert_eq!(breaker.observe(&delete_event()), BreakerAction::Counted);
        assert_eq!(breaker.consecutive_deletes(), 2);
    }

    #[test]
    fn test_neutral_events_do_not_touch_counter() {
        let mut breaker = SafetyBreaker::new(3);
        breaker.observe(&delete_event());
        let neutral = TrustEvent::AppOpened { at: Utc::now() };
        assert_eq!(breaker.observe(&neutral), BreakerAction::None);
        assert_eq!(breaker.consecutive_deletes(), 1);
    }

    #[test]
    fn test_downgrade_map_floors_at_observer() {
        assert_eq!(
            SafetyBreaker::downgrade_target(TrustPhase::FullGhost),
            TrustPhase::Transformer
        );
        assert_eq!(
            SafetyBreaker::downgrade_target(TrustPhase::Scheduler),
            TrustPhase::Observer
        );
        assert_eq!(
            SafetyBreaker::downgrade_target(TrustPhase::Observer),
            TrustPhase::Observer
        );
    }
}
