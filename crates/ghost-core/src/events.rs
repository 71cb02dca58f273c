//! Trust events and the workout data model.
//!
//! Every user action the engine can learn from produces a `TrustEvent`.
//! Events carry the timestamp of occurrence; ingestion ordering is
//! authoritative. De-duplication is by `(kind, source_id, occurred_at)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Workout modality, as detected from health data or assigned to a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutType {
    Strength,
    Run,
    Ride,
    Swim,
    Yoga,
    Hiit,
    Walk,
    Mobility,
    Other,
}

impl WorkoutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strength => "strength",
            Self::Run => "run",
            Self::Ride => "ride",
            Self::Swim => "swim",
            Self::Yoga => "yoga",
            Self::Hiit => "hiit",
            Self::Walk => "walk",
            Self::Mobility => "mobility",
            Self::Other => "other",
        }
    }

    pub fn all() -> [WorkoutType; 9] {
        [
            Self::Strength,
            Self::Run,
            Self::Ride,
            Self::Swim,
            Self::Yoga,
            Self::Hiit,
            Self::Walk,
            Self::Mobility,
            Self::Other,
        ]
    }
}

impl std::str::FromStr for WorkoutType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strength" => Ok(Self::Strength),
            "run" => Ok(Self::Run),
            "ride" => Ok(Self::Ride),
            "swim" => Ok(Self::Swim),
            "yoga" => Ok(Self::Yoga),
            "hiit" => Ok(Self::Hiit),
            "walk" => Ok(Self::Walk),
            "mobility" => Ok(Self::Mobility),
            "other" => Ok(Self::Other),
            _ => Err(ValidationError::InvalidValue {
                field: "workout_type".into(),
                message: format!("unknown workout type '{s}'"),
            }),
        }
    }
}

/// Training block lifecycle status.
///
/// `Scheduled` is the only non-terminal state; a block never moves between
/// terminal states (in particular never `Completed` <-> `Missed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Scheduled,
    Completed,
    Missed,
    Deleted,
    Transformed,
}

impl BlockStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Scheduled)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: BlockStatus) -> bool {
        match self {
            Self::Scheduled => next != Self::Scheduled,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Missed => "missed",
            Self::Deleted => "deleted",
            Self::Transformed => "transformed",
        }
    }
}

/// A scheduled workout block on the user's calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingBlock {
    pub id: String,
    /// Backing calendar event, when one exists.
    pub calendar_event_id: Option<String>,
    pub workout_type: WorkoutType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Decisive for attribution: deleting an auto-scheduled block hurts
    /// trust more than deleting a user-created one.
    pub was_auto_scheduled: bool,
    pub status: BlockStatus,
    /// Workout description generated for this block, if any.
    pub generated_workout: Option<String>,
}

impl TrainingBlock {
    pub fn new(
        workout_type: WorkoutType,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        was_auto_scheduled: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            calendar_event_id: None,
            workout_type,
            start_time,
            end_time,
            was_auto_scheduled,
            status: BlockStatus::Scheduled,
            generated_workout: None,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    /// Move the block to a terminal status, enforcing the lifecycle.
    pub fn transition_to(&mut self, next: BlockStatus) -> Result<(), ValidationError> {
        if !self.status.can_transition_to(next) {
            return Err(ValidationError::IllegalStatusTransition {
                block_id: self.id.clone(),
                from: self.status.as_str().into(),
                to: next.as_str().into(),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// A workout detected from health data. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedWorkout {
    pub id: String,
    pub workout_type: WorkoutType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_minutes: f64,
    pub active_calories: f64,
    pub average_heart_rate: Option<f64>,
    /// Originating source (e.g. "healthkit", "manual").
    pub source: String,
}

impl DetectedWorkout {
    pub fn new(
        workout_type: WorkoutType,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        active_calories: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workout_type,
            start_date,
            end_date,
            duration_minutes: (end_date - start_date).num_seconds() as f64 / 60.0,
            active_calories,
            average_heart_rate: None,
            source: "healthkit".into(),
        }
    }

    /// Whether this workout plausibly fulfils the given block: same
    /// modality (or `Other`) and overlapping in time.
    pub fn fulfils(&self, block: &TrainingBlock) -> bool {
        let type_matches = self.workout_type == block.workout_type
            || self.workout_type == WorkoutType::Other
            || block.workout_type == WorkoutType::Other;
        let overlaps = self.start_date < block.end_time && self.end_date > block.start_time;
        type_matches && overlaps
    }
}

/// Why a block was missed, as reported by the user in triage.
///
/// Each reason carries a fixed excuse weight in `[0, 1]`; `NoReason` keeps
/// the full penalty, a recognized excuse shrinks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedReason {
    LifeHappened,
    TooTired,
    CalendarConflict,
    Illness,
    TravelMode,
    PoorRecovery,
    EmergencyConflict,
    NoReason,
}

impl MissedReason {
    pub fn excuse_weight(&self) -> f64 {
        match self {
            Self::LifeHappened => 0.30,
            Self::TooTired => 0.40,
            Self::CalendarConflict => 0.20,
            Self::Illness => 0.10,
            Self::TravelMode => 0.05,
            Self::PoorRecovery => 0.15,
            Self::EmergencyConflict => 0.10,
            Self::NoReason => 1.0,
        }
    }

    pub fn all() -> [MissedReason; 8] {
        [
            Self::LifeHappened,
            Self::TooTired,
            Self::CalendarConflict,
            Self::Illness,
            Self::TravelMode,
            Self::PoorRecovery,
            Self::EmergencyConflict,
            Self::NoReason,
        ]
    }
}

/// Discriminant of a trust event, used for de-duplication and attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WorkoutCompleted,
    BlockAccepted,
    BlockDeleted,
    BlockMissed,
    ProposalAccepted,
    ProposalRejected,
    TriageResponded,
    PermissionRevoked,
    AppOpened,
}

/// De-duplication key: re-submitting an event with the same key is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub kind: EventKind,
    pub source_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// Every user action the trust engine can learn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrustEvent {
    WorkoutCompleted {
        workout: DetectedWorkout,
        at: DateTime<Utc>,
    },
    BlockAccepted {
        block: TrainingBlock,
        at: DateTime<Utc>,
    },
    BlockDeleted {
        block: TrainingBlock,
        at: DateTime<Utc>,
    },
    BlockMissed {
        block: TrainingBlock,
        reason: MissedReason,
        at: DateTime<Utc>,
    },
    ProposalAccepted {
        proposal_id: String,
        at: DateTime<Utc>,
    },
    ProposalRejected {
        proposal_id: String,
        at: DateTime<Utc>,
    },
    TriageResponded {
        reason: MissedReason,
        at: DateTime<Utc>,
    },
    PermissionRevoked {
        scope: String,
        at: DateTime<Utc>,
    },
    AppOpened {
        at: DateTime<Utc>,
    },
}

impl TrustEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::WorkoutCompleted { .. } => EventKind::WorkoutCompleted,
            Self::BlockAccepted { .. } => EventKind::BlockAccepted,
            Self::BlockDeleted { .. } => EventKind::BlockDeleted,
            Self::BlockMissed { .. } => EventKind::BlockMissed,
            Self::ProposalAccepted { .. } => EventKind::ProposalAccepted,
            Self::ProposalRejected { .. } => EventKind::ProposalRejected,
            Self::TriageResponded { .. } => EventKind::TriageResponded,
            Self::PermissionRevoked { .. } => EventKind::PermissionRevoked,
            Self::AppOpened { .. } => EventKind::AppOpened,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::WorkoutCompleted { at, .. }
            | Self::BlockAccepted { at, .. }
            | Self::BlockDeleted { at, .. }
            | Self::BlockMissed { at, .. }
            | Self::ProposalAccepted { at, .. }
            | Self::ProposalRejected { at, .. }
            | Self::TriageResponded { at, .. }
            | Self::PermissionRevoked { at, .. }
            | Self::AppOpened { at } => *at,
        }
    }

    /// Identifier of the object the event refers to, for de-duplication.
    pub fn source_id(&self) -> &str {
        match self {
            Self::WorkoutCompleted { workout, .. } => &workout.id,
            Self::BlockAccepted { block, .. }
            | Self::BlockDeleted { block, .. }
            | Self::BlockMissed { block, .. } => &block.id,
            Self::ProposalAccepted { proposal_id, .. }
            | Self::ProposalRejected { proposal_id, .. } => proposal_id,
            Self::PermissionRevoked { scope, .. } => scope,
            Self::TriageResponded { .. } | Self::AppOpened { .. } => "",
        }
    }

    pub fn dedup_key(&self) -> EventKey {
        EventKey {
            kind: self.kind(),
            source_id: self.source_id().to_string(),
            occurred_at: self.occurred_at(),
        }
    }
}
