//! # Ghost Core Library
//!
//! This library is the behavioral-autonomy core of the Ghost fitness
//! companion. It progressively earns (or loses) permission to act on the
//! user's behalf: from passively observing workouts, through proposing and
//! auto-scheduling sessions, to autonomously transforming a planned
//! schedule in response to recovery, calendar, and skip-risk signals.
//! Everything around it -- HTTP and HealthKit adapters, notification
//! delivery, UI shells -- is plumbing that implements the provider traits
//! in [`providers`].
//!
//! ## Architecture
//!
//! - **Trust**: a five-phase state machine with weighted attribution and a
//!   consecutive-deletion safety breaker
//! - **Phenome**: three data tiers (raw signals, derived state, behavioral
//!   memory) with single-writer stores and snapshot reads
//! - **Analytics**: recovery scoring, behavior patterns, skip prediction,
//!   and optimal-window finding over immutable snapshots
//! - **Orchestration**: morning/evening cycles with retry, budget, and
//!   decision receipts
//!
//! ## Key Components
//!
//! - [`GhostEngine`]: the cycle orchestrator and inbound API
//! - [`TrustStateMachine`]: authoritative `(phase, trust score)` pair
//! - [`PhenomeCoordinator`]: the three-tier data model
//! - [`Database`]: SQLite persistence with versioned migrations

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod metrics;
pub mod patterns;
pub mod phenome;
pub mod providers;
pub mod receipt;
pub mod recovery;
pub mod simulation;
pub mod skip;
pub mod storage;
pub mod trust;
pub mod windows;

pub use config::{
    BaseWeights, GhostConfig, RecoveryFactorWeights, SkipFeatureWeights, WindowFactorWeights,
};
pub use engine::{
    CycleKind, CycleReport, GhostEngine, GhostSnapshot, ProposalRecord, SubmitOutcome,
};
pub use error::{ConfigError, CoreError, PersistenceError, ProviderError, Result, ValidationError};
pub use events::{
    BlockStatus, DetectedWorkout, EventKey, EventKind, MissedReason, TrainingBlock, TrustEvent,
    WorkoutType,
};
pub use metrics::{metric_ids, MetricRegistry, MetricVersion, ProvenanceEntry, PROVENANCE_CAPACITY};
pub use patterns::{
    DayPeriod, PatternDetector, PeriodPattern, SkipPatterns, StreakPatterns, TypePattern,
    UserBehaviorPatterns, WeekdayClass, WeekdayPattern,
};
pub use phenome::{
    BehavioralMemory, BehavioralMemoryStore, DerivedStateStore, HrvReading, MorningState,
    PhenomeCoordinator, RawSignalStore, RestingHrSample, SacredTime, SacredTimeReason, SleepRecord,
    TimeSlotKey, TimeSlotStats, WorkoutPreferences, WorkoutStatistics,
};
pub use providers::{
    CalendarProvider, HealthProvider, PersistedState, PhenomePersistence, ProposalDelivery,
    ReceiptSink,
};
pub use receipt::{
    Alternative, ContextSnapshot, DecisionReceipt, ReceiptOutcome, ReceiptType, TrustImpact,
};
pub use recovery::{
    FactorImpact, FactorTrend, IntensitySuggestion, RecoveryAction, RecoveryAnalyzer,
    RecoveryFactor, RecoveryScore, RecoveryStatus,
};
pub use simulation::{
    MixWeights, ScenarioKind, SimulationSeed, TrajectoryResult, TrustSimulator,
};
pub use skip::{
    FeatureContribution, SkipContext, SkipModel, SkipPrediction, SkipPredictor, SkipRecommendation,
};
pub use storage::Database;
pub use trust::{
    AppliedEvent, AttributionEngine, BreakerAction, Capability, EventDisposition, PhaseTransition,
    SafetyBreaker, TransitionCause, TrustPhase, TrustRecord, TrustStateMachine,
};
pub use windows::{OptimalWindowFinder, ScoredWindow, TimeWindow, WindowRequest, WindowScore};
