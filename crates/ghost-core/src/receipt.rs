//! Decision receipts.
//!
//! Every non-trivial act the engine takes -- a phase transition, a breaker
//! downgrade, a proposal, a proactive reschedule -- produces an auditable
//! `DecisionReceipt`: what was decided, with what confidence, on which
//! inputs, and what the considered-but-rejected alternatives were.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::trust::phase::TrustPhase;

/// Kind of decision being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptType {
    PhasePromotion,
    PhaseRegression,
    SafetyBreakerDowngrade,
    BlockProposal,
    ProactiveReschedule,
    CycleSummary,
}

impl ReceiptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhasePromotion => "phase_promotion",
            Self::PhaseRegression => "phase_regression",
            Self::SafetyBreakerDowngrade => "safety_breaker_downgrade",
            Self::BlockProposal => "block_proposal",
            Self::ProactiveReschedule => "proactive_reschedule",
            Self::CycleSummary => "cycle_summary",
        }
    }
}

/// How the user eventually responded, when a response applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptOutcome {
    Accepted,
    Rejected,
    Expired,
}

/// Pre-computed trust consequences of the user's possible responses,
/// calibrated by the attribution engine before the user answers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TrustImpact {
    pub if_accepted: f64,
    pub if_rejected: f64,
}

/// An option that was considered and rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub option: String,
    pub rejected_because: String,
}

/// Trust state at the moment of the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub phase: TrustPhase,
    pub trust_score: f64,
    pub recovery_score: Option<f64>,
}

/// Audit artifact for a single decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionReceipt {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub receipt_type: ReceiptType,
    pub outcome: Option<ReceiptOutcome>,
    /// Engine confidence in the decision, 0.0 to 1.0.
    pub confidence: f64,
    pub trust_impact: TrustImpact,
    /// Named inputs the decision was computed from.
    pub inputs: BTreeMap<String, serde_json::Value>,
    /// Human-readable statement of what was decided.
    pub decision: String,
    pub alternatives: Vec<Alternative>,
    pub context: ContextSnapshot,
}

impl DecisionReceipt {
    pub fn new(
        receipt_type: ReceiptType,
        decision: impl Into<String>,
        timestamp: DateTime<Utc>,
        context: ContextSnapshot,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            receipt_type,
            outcome: None,
            confidence: 1.0,
            trust_impact: TrustImpact::default(),
            inputs: BTreeMap::new(),
            decision: decision.into(),
            alternatives: Vec::new(),
            context,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_trust_impact(mut self, impact: TrustImpact) -> Self {
        self.trust_impact = impact;
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    pub fn with_alternative(
        mut self,
        option: impl Into<String>,
        rejected_because: impl Into<String>,
    ) -> Self {
        self.alternatives.push(Alternative {
            option: option.into(),
            rejected_because: rejected_because.into(),
        });
        self
    }

    pub fn resolve(&mut self, outcome: ReceiptOutcome) {
        self.outcome = Some(outcome);
    }
}
