//! Trust subsystem: phases, attribution, safety breaker, state machine.

pub mod attribution;
pub mod breaker;
pub mod machine;
pub mod phase;

pub use attribution::{AttributionEngine, MAX_DELTA_MAGNITUDE};
pub use breaker::{BreakerAction, SafetyBreaker};
pub use machine::{
    AppliedEvent, EventDisposition, PhaseTransition, TransitionCause, TrustRecord,
    TrustStateMachine,
};
pub use phase::{Capability, TrustPhase};
