//! Ghost engine: the cycle orchestrator.
//!
//! Wires the trust state machine, the phenome, and the analytic components
//! behind the narrow inbound API: `submit`, `run_morning_cycle`,
//! `run_evening_cycle`, `can_perform`, `snapshot`. Collaborators are
//! injected as capability traits, so the engine is instantiable many times
//! in one process.
//!
//! Cycles run under a retry policy with a wall-clock budget. A cancelled
//! or timed-out attempt leaves state consistent: fully applied events
//! remain, half-computed analytics are discarded, and the next attempt or
//! the next scheduled cycle starts clean.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex as StdMutex, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::GhostConfig;
use crate::error::{CoreError, Result};
use crate::events::{BlockStatus, DetectedWorkout, MissedReason, TrainingBlock, TrustEvent};
use crate::metrics::{metric_ids, MetricRegistry};
use crate::patterns::{PatternDetector, UserBehaviorPatterns};
use crate::phenome::behavior::TimeSlotKey;
use crate::phenome::{MorningState, PhenomeCoordinator};
use crate::providers::{
    CalendarProvider, HealthProvider, PersistedState, PhenomePersistence, ReceiptSink,
};
use crate::receipt::{ContextSnapshot, DecisionReceipt, ReceiptType};
use crate::recovery::{RecoveryAnalyzer, RecoveryScore};
use crate::skip::{SkipContext, SkipModel, SkipPredictor, SkipRecommendation};
use crate::trust::machine::{EventDisposition, PhaseTransition, TrustStateMachine};
use crate::trust::phase::{Capability, TrustPhase};
use crate::windows::{OptimalWindowFinder, ScoredWindow, WindowRequest};

/// Which scheduled cycle ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleKind {
    Morning,
    Evening,
}

/// Outcome of one cycle invocation, including its retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub kind: CycleKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempts: u32,
    pub succeeded: bool,
    pub blocks_assessed: u32,
    pub proposals_emitted: u32,
    pub events_emitted: u32,
    /// Last attempt's failure, when all attempts were exhausted.
    pub failure: Option<String>,
}

/// A proposal awaiting the user's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub id: String,
    pub block_id: String,
    pub suggested_start: DateTime<Utc>,
    pub skip_probability: f64,
    pub emitted_at: DateTime<Utc>,
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostSnapshot {
    pub phase: TrustPhase,
    pub trust_score: f64,
    pub capabilities: Vec<Capability>,
    pub last_cycle: Option<CycleReport>,
    pub pending_proposals: Vec<ProposalRecord>,
}

/// What happened to a submitted event.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Applied {
        delta: f64,
        transition: Option<PhaseTransition>,
    },
    /// Already seen; no state change.
    Duplicate,
    /// Applied in memory but persistence failed; rolled back and queued.
    /// The caller may retry later, autonomous acts are fail-safed until
    /// the queue drains.
    RetryAdvised,
}

#[derive(Debug, Clone, Copy)]
struct PublishedTrust {
    phase: TrustPhase,
    trust_score: f64,
    has_pending: bool,
}

/// Days of signal history fetched on a morning refresh.
const SIGNAL_FETCH_DAYS: u32 = 30;

#[derive(Debug, Default)]
struct CycleCounters {
    blocks_assessed: u32,
    proposals_emitted: u32,
    events_emitted: u32,
}

/// The orchestrator. Generic over its collaborators.
pub struct GhostEngine<H, C, R, P> {
    config: GhostConfig,
    machine: Mutex<TrustStateMachine>,
    published: RwLock<PublishedTrust>,
    phenome: PhenomeCoordinator,
    patterns: StdMutex<PatternDetector>,
    recovery: RecoveryAnalyzer,
    skip: SkipPredictor,
    windows: OptimalWindowFinder,
    metrics: StdMutex<MetricRegistry>,
    pending_proposals: StdMutex<Vec<ProposalRecord>>,
    last_cycle: StdMutex<Option<CycleReport>>,
    health: H,
    calendar: C,
    receipts: R,
    persistence: P,
}

impl<H, C, R, P> GhostEngine<H, C, R, P>
where
    H: HealthProvider,
    C: CalendarProvider,
    R: ReceiptSink,
    P: PhenomePersistence,
{
    /// Construct the engine, validating configuration (fatal on error) and
    /// restoring persisted state when available.
    pub async fn new(
        config: GhostConfig,
        health: H,
        calendar: C,
        receipts: R,
        persistence: P,
    ) -> Result<Self> {
        config.validate()?;
        let now = Utc::now();

        let (machine, phenome) = match persistence.load().await {
            Ok(Some(state)) => (
                TrustStateMachine::from_record(&config, state.trust),
                PhenomeCoordinator::with_behavior(state.behavioral),
            ),
            Ok(None) => (TrustStateMachine::new(&config, now), PhenomeCoordinator::new()),
            Err(e) => {
                warn!(error = %e, "state load failed, starting fresh");
                (TrustStateMachine::new(&config, now), PhenomeCoordinator::new())
            }
        };

        let published = PublishedTrust {
            phase: machine.current_phase(),
            trust_score: machine.trust_score(),
            has_pending: false,
        };

        Ok(Self {
            patterns: StdMutex::new(PatternDetector::new(config.pattern_cache_hours)),
            recovery: RecoveryAnalyzer::new(config.recovery_weights),
            skip: SkipPredictor::new(config.feature_weights),
            windows: OptimalWindowFinder::new(&config),
            metrics: StdMutex::new(MetricRegistry::new()),
            pending_proposals: StdMutex::new(Vec::new()),
            last_cycle: StdMutex::new(None),
            machine: Mutex::new(machine),
            published: RwLock::new(published),
            phenome,
            config,
            health,
            calendar,
            receipts,
            persistence,
        })
    }

    pub fn config(&self) -> &GhostConfig {
        &self.config
    }

    pub fn phenome(&self) -> &PhenomeCoordinator {
        &self.phenome
    }

    // ── Inbound API ──────────────────────────────────────────────────

    /// Gate for any autonomous act. Fails safe while persistence is
    /// degraded: nothing above `Scheduler` is allowed with events pending.
    pub fn can_perform(&self, capability: Capability) -> bool {
        let published = self.published.read().expect("published trust lock poisoned");
        if published.has_pending && !TrustPhase::Scheduler.grants(capability) {
            return false;
        }
        published.phase.grants(capability)
    }

    pub fn snapshot(&self) -> GhostSnapshot {
        let published = self.published.read().expect("published trust lock poisoned");
        GhostSnapshot {
            phase: published.phase,
            trust_score: published.trust_score,
            capabilities: published.phase.capabilities().to_vec(),
            last_cycle: self
                .last_cycle
                .lock()
                .expect("last cycle lock poisoned")
                .clone(),
            pending_proposals: self
                .pending_proposals
                .lock()
                .expect("pending proposals lock poisoned")
                .clone(),
        }
    }

    /// Submit one trust event. Events are serialized through the machine's
    /// mailbox; re-submitting the same `(kind, source_id, timestamp)` is a
    /// no-op.
    pub async fn submit(&self, event: TrustEvent) -> Result<SubmitOutcome> {
        let mut machine = self.machine.lock().await;
        let before = machine.record(event.occurred_at());

        let applied = match machine.handle(&event) {
            EventDisposition::Duplicate => return Ok(SubmitOutcome::Duplicate),
            EventDisposition::Applied(applied) => applied,
        };

        let behavioral_before = self.phenome.behavior_snapshot();
        self.apply_behavioral_effects(&event);

        let state = PersistedState {
            trust: machine.record(event.occurred_at()),
            behavioral: (*self.phenome.behavior_snapshot()).clone(),
        };
        match self.persistence.save(&state).await {
            Ok(()) => {
                for receipt in applied.receipts {
                    if let Err(e) = self.receipts.emit(receipt).await {
                        warn!(error = %e, "receipt emission failed");
                    }
                }
                self.publish(&machine);
                Ok(SubmitOutcome::Applied {
                    delta: applied.delta + applied.streak_bonus,
                    transition: applied.transition,
                })
            }
            Err(e) => {
                // Undo both the trust transition and the behavioral side
                // effects; the retried event will re-apply them.
                warn!(error = %e, "trust state save failed, rolling back");
                self.phenome.behavior().restore_snapshot(behavioral_before);
                machine.rollback(before, event, self.config.safety_breaker_consecutive_threshold);
                self.publish(&machine);
                Ok(SubmitOutcome::RetryAdvised)
            }
        }
    }

    /// Resolve a pending proposal with the user's answer, feeding the
    /// matching trust event back through the mailbox.
    pub async fn resolve_proposal(
        &self,
        proposal_id: &str,
        accepted: bool,
        at: DateTime<Utc>,
    ) -> Result<SubmitOutcome> {
        let found = {
            let mut proposals = self
                .pending_proposals
                .lock()
                .expect("pending proposals lock poisoned");
            let index = proposals.iter().position(|p| p.id == proposal_id);
            index.map(|i| proposals.remove(i))
        };
        if found.is_none() {
            return Err(CoreError::Custom(format!("unknown proposal '{proposal_id}'")));
        }

        let event = if accepted {
            TrustEvent::ProposalAccepted {
                proposal_id: proposal_id.to_string(),
                at,
            }
        } else {
            TrustEvent::ProposalRejected {
                proposal_id: proposal_id.to_string(),
                at,
            }
        };
        self.submit(event).await
    }

    pub async fn run_morning_cycle(&self) -> CycleReport {
        self.run_morning_cycle_at(Utc::now()).await
    }

    pub async fn run_evening_cycle(&self) -> CycleReport {
        self.run_evening_cycle_at(Utc::now()).await
    }

    /// Morning cycle at an explicit instant. The wall clock is always
    /// passed in, never read mid-computation.
    pub async fn run_morning_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        self.run_cycle(CycleKind::Morning, now).await
    }

    /// Evening cycle at an explicit instant.
    pub async fn run_evening_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        self.run_cycle(CycleKind::Evening, now).await
    }

    // ── Cycle machinery ──────────────────────────────────────────────

    async fn run_cycle(&self, kind: CycleKind, now: DateTime<Utc>) -> CycleReport {
        let started_at = now;
        let budget = std::time::Duration::from_secs(self.config.cycle_budget_seconds);
        let mut failure = None;
        let mut attempts = 0;

        while attempts < self.config.max_retries_per_cycle {
            attempts += 1;
            info!(?kind, attempts, "cycle attempt");
            let attempt = async {
                match kind {
                    CycleKind::Morning => self.attempt_morning(now).await,
                    CycleKind::Evening => self.attempt_evening(now).await,
                }
            };
            match tokio::time::timeout(budget, attempt).await {
                Ok(Ok(counters)) => {
                    let report = CycleReport {
                        kind,
                        started_at,
                        finished_at: Utc::now(),
                        attempts,
                        succeeded: true,
                        blocks_assessed: counters.blocks_assessed,
                        proposals_emitted: counters.proposals_emitted,
                        events_emitted: counters.events_emitted,
                        failure: None,
                    };
                    *self.last_cycle.lock().expect("last cycle lock poisoned") =
                        Some(report.clone());
                    info!(?kind, attempts, "cycle succeeded");
                    return report;
                }
                Ok(Err(e)) => {
                    warn!(?kind, attempts, error = %e, "cycle attempt failed");
                    failure = Some(e.to_string());
                }
                Err(_) => {
                    warn!(?kind, attempts, "cycle attempt exceeded budget");
                    failure = Some(format!("budget of {}s exceeded", budget.as_secs()));
                }
            }
        }

        // Exhaustion is logged but not fatal; the next scheduled cycle
        // retries independently.
        let report = CycleReport {
            kind,
            started_at,
            finished_at: Utc::now(),
            attempts,
            succeeded: false,
            blocks_assessed: 0,
            proposals_emitted: 0,
            events_emitted: 0,
            failure,
        };
        *self.last_cycle.lock().expect("last cycle lock poisoned") = Some(report.clone());
        report
    }

    /// Morning pipeline: refresh signals -> recovery -> patterns ->
    /// skip-score today's remaining blocks -> windows and proposals for
    /// the risky ones.
    async fn attempt_morning(&self, now: DateTime<Utc>) -> Result<CycleCounters> {
        let mut counters = CycleCounters::default();
        let today = now.date_naive();

        self.retry_pending().await;
        self.refresh_raw_signals().await?;

        let recovery = {
            let raw = self.phenome.raw();
            self.recovery.analyze(&raw, now)
        };
        self.record_metric(
            metric_ids::RECOVERY_COMPOSITE,
            &recovery.factors.iter().map(|f| f.normalized).collect::<Vec<_>>(),
            recovery.score,
            now,
        );
        debug!(score = recovery.score, status = ?recovery.status, "recovery computed");

        let patterns = self.refresh_patterns(now);

        let busy = self
            .calendar
            .busy_slots(today)
            .await
            .map_err(CoreError::Provider)?;
        let calendar_density = self.calendar_density(&busy);

        let memory = self.phenome.behavior_snapshot();
        let todays_blocks: Vec<TrainingBlock> = {
            let derived = self.phenome.derived();
            derived
                .blocks_on(today)
                .into_iter()
                .filter(|b| b.status == BlockStatus::Scheduled && b.start_time > now)
                .cloned()
                .collect()
        };

        let mut high_risk = 0u32;
        for block in &todays_blocks {
            counters.blocks_assessed += 1;
            let slot = TimeSlotKey::from_datetime(&block.start_time);
            let ctx = SkipContext {
                block,
                slot_stats: memory.slot_stats(slot),
                patterns: Some(&patterns),
                recovery: Some(&recovery),
                calendar_density,
                historical_data_points: patterns.data_points,
                current_streak_days: patterns.streaks.current_streak_days,
            };
            let prediction = self.skip.predict(&ctx, now);
            self.record_metric(
                metric_ids::SKIP_PROBABILITY,
                &[calendar_density, recovery.score, prediction.confidence],
                prediction.probability,
                now,
            );

            if prediction.recommendation < SkipRecommendation::SuggestAlternative {
                continue;
            }
            high_risk += 1;

            let request = WindowRequest {
                date: today,
                workout_duration_minutes: block.duration_minutes(),
                count: 3,
            };
            let candidates = self.windows.find(&request, &busy, &memory, Some(&patterns));
            let Some(best) = candidates.first() else {
                debug!(block = %block.id, "no alternative window available");
                continue;
            };
            self.record_metric(
                metric_ids::WINDOW_SCORE,
                &[best.score.historical_success, best.score.energy],
                best.score.total,
                now,
            );

            counters.proposals_emitted += self
                .emit_proposal(block, best, &candidates[1..], &prediction.recommendation, prediction.probability, prediction.confidence, &recovery, now)
                .await? as u32;
        }

        {
            let mut derived = self.phenome.derived_mut();
            derived.set_morning_state(MorningState {
                date: today,
                recovery_score: recovery.score,
                recovery_status: recovery.status,
                high_risk_blocks: high_risk,
                proposals_emitted: counters.proposals_emitted,
                computed_at: now,
            });
        }
        self.persist_current_state(now).await?;
        Ok(counters)
    }

    /// Evening pipeline: reconcile today's blocks against detected
    /// workouts, feed the resulting events through the mailbox, prune
    /// retention horizons.
    async fn attempt_evening(&self, now: DateTime<Utc>) -> Result<CycleCounters> {
        let mut counters = CycleCounters::default();
        let today = now.date_naive();

        self.retry_pending().await;

        let workouts = self
            .health
            .recent_workouts(1)
            .await
            .map_err(CoreError::Provider)?;
        {
            let mut raw = self.phenome.raw_mut();
            for workout in &workouts {
                raw.append_workout(workout.clone());
            }
        }

        let due: Vec<TrainingBlock> = {
            let derived = self.phenome.derived();
            derived
                .blocks_on(today)
                .into_iter()
                .filter(|b| b.status == BlockStatus::Scheduled && b.end_time <= now)
                .cloned()
                .collect()
        };

        for block in due {
            counters.blocks_assessed += 1;
            let fulfilled = workouts.iter().find(|w| w.fulfils(&block)).cloned();
            let (status, event) = match fulfilled {
                Some(workout) => (
                    BlockStatus::Completed,
                    TrustEvent::WorkoutCompleted {
                        at: workout.end_date,
                        workout,
                    },
                ),
                // Missed until the user triages; a later TriageResponded
                // event softens nothing retroactively but earns goodwill.
                None => (
                    BlockStatus::Missed,
                    TrustEvent::BlockMissed {
                        block: block.clone(),
                        reason: MissedReason::NoReason,
                        at: block.end_time,
                    },
                ),
            };
            {
                let mut derived = self.phenome.derived_mut();
                if let Err(e) = derived.transition_block(&block.id, status) {
                    warn!(block = %block.id, error = %e, "block reconciliation skipped");
                    continue;
                }
            }
            self.submit(event).await?;
            counters.events_emitted += 1;
        }

        self.phenome.prune(
            now,
            self.config.raw_signal_retention_days,
            self.config.derived_state_retention_days,
        );
        self.persist_current_state(now).await?;
        Ok(counters)
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn refresh_raw_signals(&self) -> Result<()> {
        // The recovery baseline needs 30 days of signal history.
        let days = SIGNAL_FETCH_DAYS;
        let sleep = self.health.recent_sleep(days).await.map_err(CoreError::Provider)?;
        let hrv = self.health.recent_hrv(days).await.map_err(CoreError::Provider)?;
        let resting = self
            .health
            .recent_resting_hr(days)
            .await
            .map_err(CoreError::Provider)?;
        let workouts = self
            .health
            .recent_workouts(days)
            .await
            .map_err(CoreError::Provider)?;

        let mut raw = self.phenome.raw_mut();
        for record in sleep {
            raw.append_sleep(record);
        }
        for reading in hrv {
            raw.append_hrv(reading);
        }
        for sample in resting {
            raw.append_resting_hr(sample);
        }
        for workout in workouts {
            raw.append_workout(workout);
        }
        Ok(())
    }

    fn refresh_patterns(&self, now: DateTime<Utc>) -> UserBehaviorPatterns {
        let blocks: Vec<TrainingBlock> = {
            let derived = self.phenome.derived();
            derived.blocks().cloned().collect()
        };
        let workouts: Vec<DetectedWorkout> = {
            let raw = self.phenome.raw();
            raw.workouts_since(now - Duration::days(30))
                .into_iter()
                .cloned()
                .collect()
        };
        let patterns = {
            let mut detector = self.patterns.lock().expect("pattern detector lock poisoned");
            detector.patterns(&blocks, &workouts, now).clone()
        };
        self.phenome.behavior().set_patterns(patterns.clone());
        patterns
    }

    fn calendar_density(&self, busy: &[crate::windows::TimeWindow]) -> f64 {
        let span_minutes =
            ((self.config.day_end_hour - self.config.day_start_hour) as i64) * 60;
        if span_minutes <= 0 {
            return 0.0;
        }
        let busy_minutes: i64 = busy.iter().map(|w| w.duration_minutes()).sum();
        (busy_minutes as f64 / span_minutes as f64).clamp(0.0, 1.0)
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_proposal(
        &self,
        block: &TrainingBlock,
        best: &ScoredWindow,
        runners_up: &[ScoredWindow],
        recommendation: &SkipRecommendation,
        probability: f64,
        confidence: f64,
        recovery: &RecoveryScore,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        // A retried attempt must not stack a second proposal for the same
        // block.
        {
            let proposals = self
                .pending_proposals
                .lock()
                .expect("pending proposals lock poisoned");
            if proposals.iter().any(|p| p.block_id == block.id) {
                return Ok(false);
            }
        }

        let (phase, trust_score, impact) = {
            let machine = self.machine.lock().await;
            (
                machine.current_phase(),
                machine.trust_score(),
                machine.preview_proposal_impact(),
            )
        };

        let receipt_type = if *recommendation == SkipRecommendation::ProactiveReschedule {
            ReceiptType::ProactiveReschedule
        } else {
            ReceiptType::BlockProposal
        };
        let mut receipt = DecisionReceipt::new(
            receipt_type,
            format!(
                "move {} block {} to {}",
                block.workout_type.as_str(),
                block.id,
                best.suggested_start.format("%H:%M")
            ),
            now,
            ContextSnapshot {
                phase,
                trust_score,
                recovery_score: Some(recovery.score),
            },
        )
        .with_confidence(confidence)
        .with_trust_impact(impact)
        .with_input("skip_probability", probability)
        .with_input("recommendation", recommendation.as_str())
        .with_input("recovery_score", recovery.score)
        .with_input("window_score", best.score.total);
        for alternative in runners_up {
            receipt = receipt.with_alternative(
                alternative.suggested_start.format("%H:%M").to_string(),
                format!("scored {:.2} vs {:.2}", alternative.score.total, best.score.total),
            );
        }

        // A proactive reschedule may be handed to the calendar layer, but
        // only when the current phase grants block creation.
        if *recommendation == SkipRecommendation::ProactiveReschedule
            && self.can_perform(Capability::AutoCreateBlocks)
        {
            let mut replacement = TrainingBlock::new(
                block.workout_type,
                best.suggested_start,
                best.suggested_start + Duration::minutes(block.duration_minutes()),
                true,
            );
            replacement.generated_workout = block.generated_workout.clone();
            if let Err(e) = self.calendar.propose(&replacement).await {
                warn!(error = %e, "calendar proposal delivery failed");
            }
        }

        let record = ProposalRecord {
            id: receipt.id.clone(),
            block_id: block.id.clone(),
            suggested_start: best.suggested_start,
            skip_probability: probability,
            emitted_at: now,
        };

        self.receipts
            .emit(receipt)
            .await
            .map_err(CoreError::Provider)?;
        self.pending_proposals
            .lock()
            .expect("pending proposals lock poisoned")
            .push(record);
        Ok(true)
    }

    /// Behavioral side effects of an event: slot history and penalties.
    fn apply_behavioral_effects(&self, event: &TrustEvent) {
        let behavior = self.phenome.behavior();
        match event {
            TrustEvent::WorkoutCompleted { workout, at } => {
                let slot = TimeSlotKey::from_datetime(&workout.start_date);
                behavior.record_slot_completed(slot, *at);
            }
            TrustEvent::BlockMissed { block, at, .. } => {
                let slot = TimeSlotKey::from_datetime(&block.start_time);
                behavior.record_slot_missed(slot, *at);
            }
            TrustEvent::BlockDeleted { block, at } => {
                let slot = TimeSlotKey::from_datetime(&block.start_time);
                if let Some(sacred) = behavior.record_penalty(slot, *at) {
                    info!(slot = ?sacred.slot, "slot became sacred after repeated deletions");
                }
            }
            _ => {}
        }
    }

    /// Re-apply events whose persistence failed earlier. Still-failing
    /// saves put them straight back on the pending queue.
    async fn retry_pending(&self) {
        let pending = {
            let mut machine = self.machine.lock().await;
            if !machine.has_pending() {
                return;
            }
            machine.take_pending()
        };
        info!(count = pending.len(), "retrying pending events");
        for event in pending {
            if let Err(e) = self.submit(event).await {
                warn!(error = %e, "pending event retry failed");
            }
        }
        let machine = self.machine.lock().await;
        self.publish(&machine);
    }

    async fn persist_current_state(&self, now: DateTime<Utc>) -> Result<()> {
        let state = {
            let machine = self.machine.lock().await;
            PersistedState {
                trust: machine.record(now),
                behavioral: (*self.phenome.behavior_snapshot()).clone(),
            }
        };
        self.persistence.save(&state).await.map_err(CoreError::Provider)
    }

    fn record_metric(&self, metric: &str, inputs: &[f64], output: f64, now: DateTime<Utc>) {
        self.metrics
            .lock()
            .expect("metric registry lock poisoned")
            .record(metric, inputs, output, now);
    }

    /// Provenance view for diagnostics.
    pub fn metric_provenance_len(&self) -> usize {
        self.metrics
            .lock()
            .expect("metric registry lock poisoned")
            .provenance_len()
    }

    fn publish(&self, machine: &TrustStateMachine) {
        let mut published = self.published.write().expect("published trust lock poisoned");
        *published = PublishedTrust {
            phase: machine.current_phase(),
            trust_score: machine.trust_score(),
            has_pending: machine.has_pending(),
        };
    }

    /// Seed a block into derived state (normally done by the calendar
    /// ingestion adapter).
    pub fn ingest_block(&self, block: TrainingBlock) {
        self.phenome.derived_mut().upsert_block(block);
    }

    /// Designate a weekly slot as sacred on the user's behalf.
    pub fn designate_sacred(
        &self,
        day_of_week: u8,
        hour_of_day: u8,
        reason: crate::phenome::behavior::SacredTimeReason,
    ) -> Result<()> {
        let slot = TimeSlotKey::new(day_of_week, hour_of_day)?;
        self.phenome.behavior().designate_sacred(slot, reason, Utc::now());
        Ok(())
    }
}
