//! Collaborator-provided interfaces.
//!
//! The engine is generic over these capability traits; adapters for
//! HealthKit, calendars, notification surfaces, and storage backends live
//! outside the core and implement them. Test doubles implement the same
//! traits, so nothing here depends on any concrete transport.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::events::{DetectedWorkout, TrainingBlock};
use crate::phenome::behavior::BehavioralMemory;
use crate::phenome::raw::{HrvReading, RestingHrSample, SleepRecord};
use crate::receipt::DecisionReceipt;
use crate::trust::machine::TrustRecord;
use crate::windows::TimeWindow;

/// Read-only health signals.
#[async_trait]
pub trait HealthProvider: Send + Sync {
    async fn recent_sleep(&self, days: u32) -> Result<Vec<SleepRecord>, ProviderError>;
    async fn recent_hrv(&self, days: u32) -> Result<Vec<HrvReading>, ProviderError>;
    async fn recent_resting_hr(&self, days: u32) -> Result<Vec<RestingHrSample>, ProviderError>;
    async fn recent_workouts(&self, days: u32) -> Result<Vec<DetectedWorkout>, ProviderError>;
}

/// Outcome of handing a proposed block to the calendar layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalDelivery {
    Delivered,
    Declined,
}

/// Read-only calendar busy data plus the one outbound proposal channel.
/// The engine never mutates the calendar directly.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn busy_slots(&self, date: NaiveDate) -> Result<Vec<TimeWindow>, ProviderError>;
    async fn propose(&self, block: &TrainingBlock) -> Result<ProposalDelivery, ProviderError>;
}

/// Receiver for decision receipts.
#[async_trait]
pub trait ReceiptSink: Send + Sync {
    async fn emit(&self, receipt: DecisionReceipt) -> Result<(), ProviderError>;
}

/// Durable engine state: the trust record plus behavioral memory. Raw and
/// derived tiers are rebuildable from adapters and are persisted by the
/// storage backend on its own cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub trust: TrustRecord,
    pub behavioral: BehavioralMemory,
}

/// Load/save boundary for the engine's durable state.
#[async_trait]
pub trait PhenomePersistence: Send + Sync {
    async fn load(&self) -> Result<Option<PersistedState>, ProviderError>;
    async fn save(&self, state: &PersistedState) -> Result<(), ProviderError>;
}
