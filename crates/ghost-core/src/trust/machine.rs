//! Trust state machine.
//!
//! Owns the authoritative `(phase, trust_score)` pair. Events are applied
//! one at a time in ingestion order; each application runs the safety
//! breaker, the attribution engine, the streak bonus, and at most one
//! phase transition, then reports the receipts to emit.
//!
//! The machine itself is persistence-free: the caller snapshots
//! [`TrustRecord`] before applying, persists afterwards, and rolls back on
//! a failed write. While rolled-back events are pending, capability checks
//! fail safe to the `Scheduler` ceiling.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::{info, warn};

use crate::config::GhostConfig;
use crate::events::{EventKey, TrustEvent};
use crate::receipt::{ContextSnapshot, DecisionReceipt, ReceiptType, TrustImpact};
use crate::trust::attribution::AttributionEngine;
use crate::trust::breaker::{BreakerAction, SafetyBreaker};
use crate::trust::phase::{Capability, TrustPhase};

/// Persisted snapshot of the machine's mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustRecord {
    pub phase: TrustPhase,
    pub trust_score: f64,
    pub consecutive_deletes: u32,
    pub consecutive_workout_days: u32,
    pub last_workout_day: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl TrustRecord {
    pub fn initial(at: DateTime<Utc>) -> Self {
        Self {
            phase: TrustPhase::Observer,
            trust_score: 0.0,
            consecutive_deletes: 0,
            consecutive_workout_days: 0,
            last_workout_day: None,
            updated_at: at,
        }
    }
}

/// Why a phase changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    Promotion,
    Regression,
    SafetyBreaker,
}

/// A single-step phase change observed atomically with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: TrustPhase,
    pub to: TrustPhase,
    pub cause: TransitionCause,
}

/// Result of applying one event in memory.
#[derive(Debug, Clone)]
pub struct AppliedEvent {
    /// Attributed delta, after modifiers and clamping.
    pub delta: f64,
    /// Streak bonus added on top of the delta (zero for most events).
    pub streak_bonus: f64,
    pub transition: Option<PhaseTransition>,
    pub breaker_fired: bool,
    /// Receipts the caller must emit.
    pub receipts: Vec<DecisionReceipt>,
}

/// Disposition of a submitted event.
#[derive(Debug, Clone)]
pub enum EventDisposition {
    Applied(AppliedEvent),
    /// Same `(kind, source_id, timestamp)` was already applied.
    Duplicate,
}

/// The authoritative trust state machine.
#[derive(Debug)]
pub struct TrustStateMachine {
    phase: TrustPhase,
    trust_score: f64,
    breaker: SafetyBreaker,
    attribution: AttributionEngine,
    consecutive_workout_days: u32,
    last_workout_day: Option<NaiveDate>,
    seen: HashSet<EventKey>,
    pending: VecDeque<TrustEvent>,
}

impl TrustStateMachine {
    pub fn new(config: &GhostConfig, at: DateTime<Utc>) -> Self {
        Self::from_record(config, TrustRecord::initial(at))
    }

    /// Restore from a persisted record.
    pub fn from_record(config: &GhostConfig, record: TrustRecord) -> Self {
        Self {
            phase: record.phase,
            trust_score: record.trust_score.clamp(0.0, 100.0),
            breaker: SafetyBreaker::with_count(
                config.safety_breaker_consecutive_threshold,
                record.consecutive_deletes,
            ),
            attribution: AttributionEngine::new(config.base_weights),
            consecutive_workout_days: record.consecutive_workout_days,
            last_workout_day: record.last_workout_day,
            seen: HashSet::new(),
            pending: VecDeque::new(),
        }
    }

    // ── Snapshot reads ───────────────────────────────────────────────

    pub fn current_phase(&self) -> TrustPhase {
        self.phase
    }

    pub fn trust_score(&self) -> f64 {
        self.trust_score
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        self.phase.capabilities()
    }

    pub fn consecutive_workout_days(&self) -> u32 {
        self.consecutive_workout_days
    }

    pub fn consecutive_deletes(&self) -> u32 {
        self.breaker.consecutive_deletes()
    }

    /// Gate for external collaborators before any autonomous act.
    ///
    /// While events are pending re-persistence the machine fails safe:
    /// anything beyond what `Scheduler` grants is denied.
    pub fn can_perform(&self, capability: Capability) -> bool {
        if !self.pending.is_empty() && !TrustPhase::Scheduler.grants(capability) {
            return false;
        }
        self.phase.grants(capability)
    }

    pub fn record(&self, at: DateTime<Utc>) -> TrustRecord {
        TrustRecord {
            phase: self.phase,
            trust_score: self.trust_score,
            consecutive_deletes: self.breaker.consecutive_deletes(),
            consecutive_workout_days: self.consecutive_workout_days,
            last_workout_day: self.last_workout_day,
            updated_at: at,
        }
    }

    /// Trust consequences of the user's possible responses to a proposal,
    /// used to calibrate receipts before the user answers.
    pub fn preview_proposal_impact(&self) -> TrustImpact {
        let at = Utc::now();
        let accepted = TrustEvent::ProposalAccepted {
            proposal_id: String::new(),
            at,
        };
        let rejected = TrustEvent::ProposalRejected {
            proposal_id: String::new(),
            at,
        };
        TrustImpact {
            if_accepted: self.attribution.delta(&accepted, self.phase, self.trust_score),
            if_rejected: self.attribution.delta(&rejected, self.phase, self.trust_score),
        }
    }

    // ── Pending-event bookkeeping (persistence failures) ─────────────

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Undo an in-memory application whose persistence failed and queue
    /// the event for retry.
    pub fn rollback(&mut self, record: TrustRecord, event: TrustEvent, threshold: u32) {
        self.seen.remove(&event.dedup_key());
        self.phase = record.phase;
        self.trust_score = record.trust_score;
        self.breaker = SafetyBreaker::with_count(threshold, record.consecutive_deletes);
        self.consecutive_workout_days = record.consecutive_workout_days;
        self.last_workout_day = record.last_workout_day;
        warn!(kind = ?event.kind(), "persistence failed, event queued pending");
        self.pending.push_back(event);
    }

    /// Drain pending events for reapplication once persistence recovers.
    pub fn take_pending(&mut self) -> Vec<TrustEvent> {
        self.pending.drain(..).collect()
    }

    // ── Event application ────────────────────────────────────────────

    /// Apply one event in memory.
    ///
    /// Pipeline: de-dup -> safety breaker -> attributed delta -> streak
    /// bonus -> phase re-evaluation (skipped when the breaker fired; its
    /// regression is the event's one permitted transition).
    pub fn handle(&mut self, event: &TrustEvent) -> EventDisposition {
        let key = event.dedup_key();
        if self.seen.contains(&key) {
            return EventDisposition::Duplicate;
        }
        self.seen.insert(key);

        let mut receipts = Vec::new();
        let mut transition = None;

        let breaker_fired = self.breaker.observe(event) == BreakerAction::Fired;
        if breaker_fired {
            let target = SafetyBreaker::downgrade_target(self.phase);
            let from = self.phase;
            if target != from {
                self.phase = target;
                transition = Some(PhaseTransition {
                    from,
                    to: target,
                    cause: TransitionCause::SafetyBreaker,
                });
                info!(%from, to = %target, "safety breaker downgrade");
            }
            receipts.push(
                DecisionReceipt::new(
                    ReceiptType::SafetyBreakerDowngrade,
                    format!("consecutive deletions tripped the breaker: {from} -> {}", self.phase),
                    event.occurred_at(),
                    self.context_snapshot(),
                )
                .with_input("from_phase", from.as_str())
                .with_input("to_phase", self.phase.as_str()),
            );
        }

        let delta = self.attribution.delta(event, self.phase, self.trust_score);
        self.trust_score = (self.trust_score + delta).clamp(0.0, 100.0);

        let mut streak_bonus = 0.0;
        if let TrustEvent::WorkoutCompleted { workout, .. } = event {
            self.update_streak(workout.end_date.date_naive());
            let raw = AttributionEngine::streak_bonus(self.consecutive_workout_days);
            streak_bonus = raw * AttributionEngine::diminishing_factor(self.trust_score, 1.0);
            self.trust_score = (self.trust_score + streak_bonus).clamp(0.0, 100.0);
        }

        if breaker_fired {
            // Land inside the downgraded band: a forced regression must be
            // paid back incrementally, not bounced out of on the next
            // positive event.
            if let Some(next) = self.phase.next() {
                let ceiling = (next.confidence_threshold() - 1.0).max(0.0);
                if self.trust_score > ceiling {
                    self.trust_score = ceiling;
                }
            }
        } else {
            transition = self.re_evaluate_phase(event, &mut receipts);
        }

        EventDisposition::Applied(AppliedEvent {
            delta,
            streak_bonus,
            transition,
            breaker_fired,
            receipts,
        })
    }

    /// Ordinary single-step phase re-evaluation.
    fn re_evaluate_phase(
        &mut self,
        event: &TrustEvent,
        receipts: &mut Vec<DecisionReceipt>,
    ) -> Option<PhaseTransition> {
        if self.trust_score < self.phase.confidence_threshold() {
            let from = self.phase;
            let to = from.previous()?;
            self.phase = to;
            info!(%from, %to, score = self.trust_score, "phase regression");
            receipts.push(
                DecisionReceipt::new(
                    ReceiptType::PhaseRegression,
                    format!("trust fell below {}: {from} -> {to}", from.confidence_threshold()),
                    event.occurred_at(),
                    self.context_snapshot(),
                )
                .with_input("trust_score", self.trust_score),
            );
            return Some(PhaseTransition {
                from,
                to,
                cause: TransitionCause::Regression,
            });
        }

        let next = self.phase.next()?;
        if self.trust_score >= next.confidence_threshold() {
            let from = self.phase;
            self.phase = next;
            info!(%from, to = %next, score = self.trust_score, "phase promotion");
            receipts.push(
                DecisionReceipt::new(
                    ReceiptType::PhasePromotion,
                    format!("trust reached {}: {from} -> {next}", next.confidence_threshold()),
                    event.occurred_at(),
                    self.context_snapshot(),
                )
                .with_input("trust_score", self.trust_score),
            );
            return Some(PhaseTransition {
                from,
                to: next,
                cause: TransitionCause::Promotion,
            });
        }
        None
    }

    fn update_streak(&mut self, day: NaiveDate) {
        self.consecutive_workout_days = match self.last_workout_day {
            None => 1,
            Some(last) if day == last => self.consecutive_workout_days,
            Some(last) if last.succ_opt() == Some(day) => self.consecutive_workout_days + 1,
            _ => 1,
        };
        if self.last_workout_day.map_or(true, |last| day > last) {
            self.last_workout_day = Some(day);
        }
    }

    fn context_snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            phase: self.phase,
            trust_score: self.trust_score,
            recovery_score: None,
        }
    }
}
