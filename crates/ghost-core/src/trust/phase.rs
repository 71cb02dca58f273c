//! Trust phases and the capability contract.
//!
//! Five totally ordered phases. Each phase has an immutable confidence
//! threshold (the lower bound of trust score required to remain in it) and
//! a cumulative capability set: a higher phase grants everything a lower
//! phase does.

use serde::{Deserialize, Serialize};

/// An autonomous act the engine may be permitted to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Passively observe workouts and calendar.
    Observe,
    /// Propose blocks that the user accepts manually.
    ProposeBlocks,
    /// Create blocks in the calendar without asking.
    AutoCreateBlocks,
    /// Retype or retime existing blocks without asking.
    ModifyBlocks,
    /// Full autonomous planning including recovery days.
    PlanRecovery,
}

/// Discrete level of autonomy the user has granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustPhase {
    Observer,
    Scheduler,
    AutoScheduler,
    Transformer,
    FullGhost,
}

impl TrustPhase {
    pub const ALL: [TrustPhase; 5] = [
        TrustPhase::Observer,
        TrustPhase::Scheduler,
        TrustPhase::AutoScheduler,
        TrustPhase::Transformer,
        TrustPhase::FullGhost,
    ];

    /// Lower bound of trust score required to remain in this phase.
    pub fn confidence_threshold(&self) -> f64 {
        match self {
            Self::Observer => 0.0,
            Self::Scheduler => 30.0,
            Self::AutoScheduler => 55.0,
            Self::Transformer => 75.0,
            Self::FullGhost => 90.0,
        }
    }

    /// The next phase up, if any.
    pub fn next(&self) -> Option<TrustPhase> {
        match self {
            Self::Observer => Some(Self::Scheduler),
            Self::Scheduler => Some(Self::AutoScheduler),
            Self::AutoScheduler => Some(Self::Transformer),
            Self::Transformer => Some(Self::FullGhost),
            Self::FullGhost => None,
        }
    }

    /// The previous phase down, if any.
    pub fn previous(&self) -> Option<TrustPhase> {
        match self {
            Self::Observer => None,
            Self::Scheduler => Some(Self::Observer),
            Self::AutoScheduler => Some(Self::Scheduler),
            Self::Transformer => Some(Self::AutoScheduler),
            Self::FullGhost => Some(Self::Transformer),
        }
    }

    /// Capabilities granted at this phase. Cumulative by construction.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Self::Observer => &[Capability::Observe],
            Self::Scheduler => &[Capability::Observe, Capability::ProposeBlocks],
            Self::AutoScheduler => &[
                Capability::Observe,
                Capability::ProposeBlocks,
                Capability::AutoCreateBlocks,
            ],
            Self::Transformer => &[
                Capability::Observe,
                Capability::ProposeBlocks,
                Capability::AutoCreateBlocks,
                Capability::ModifyBlocks,
            ],
            Self::FullGhost => &[
                Capability::Observe,
                Capability::ProposeBlocks,
                Capability::AutoCreateBlocks,
                Capability::ModifyBlocks,
                Capability::PlanRecovery,
            ],
        }
    }

    pub fn grants(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observer => "observer",
            Self::Scheduler => "scheduler",
            Self::AutoScheduler => "auto_scheduler",
            Self::Transformer => "transformer",
            Self::FullGhost => "full_ghost",
        }
    }
}

impl std::fmt::Display for TrustPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering() {
        assert!(TrustPhase::Observer < TrustPhase::Scheduler);
        assert!(TrustPhase::Transformer < TrustPhase::FullGhost);
    }

    #[test]
    fn test_thresholds_monotonic() {
        let mut last = -1.0;
        for phase in TrustPhase::ALL {
            assert!(phase.confidence_threshold() > last);
            last = phase.confidence_threshold();
        }
    }

    #[test]
    fn test_capabilities_monotone() {
        // If P <= P' then capabilities(P) is a subset of capabilities(P').
        for window in TrustPhase::ALL.windows(2) {
            let lower = window[0].capabilities();
            let upper = window[1].capabilities();
            for cap in lower {
                assert!(upper.contains(cap), "{:?} missing {cap:?}", window[1]);
            }
            assert!(upper.len() > lower.len());
        }
    }

    #[test]
    fn test_next_previous_inverse() {
        for phase in TrustPhase::ALL {
            if let Some(next) = phase.next() {
                assert_eq!(next.previous(), Some(phase));
            }
            if let Some(prev) = phase.previous() {
                assert_eq!(prev.next(), Some(phase));
            }
        }
    }

    #[test]
    fn test_observer_floor_and_ghost_ceiling() {
        assert!(TrustPhase::Observer.previous().is_none());
        assert!(TrustPhase::FullGhost.next().is_none());
    }
}
