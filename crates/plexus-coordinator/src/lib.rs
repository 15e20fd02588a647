// === Coordinator State Machine ===
pub mod batch_schedule;
pub mod config;
pub mod engine;
pub mod error;
pub mod membership;
pub mod phase;
pub mod providers;
pub mod registry;
pub mod round;
pub mod run;
pub mod witness;

// === Re-exports for broader ecosystem access ===
pub use batch_schedule::target_batch_size;
pub use config::{BatchRamp, RunConfig, RunPrivacy, RunTiming};
pub use config::{BLOOM_FALSE_POSITIVE_RATE, LAST_STEP_GRACE_ROUNDS, MAX_CLIENTS, MAX_WITNESSES};
pub use engine::TickOutcome;
pub use error::{CoordinatorError, Result};
pub use membership::{MembershipLedger, Participant, ParticipantState};
pub use phase::Phase;
pub use providers::{
    AccessControl, FeeCollector, FixedBeacon, NoFee, OpenAccess, OpenProviderRegistry,
    ProviderRegistry, Providers, RandomnessBeacon,
};
pub use registry::{Coordinator, SharedCoordinator};
pub use round::{Round, RoundRing, WitnessAttestation};
pub use run::{ModelDescriptor, Progress, Run};
pub use witness::{witness_quorum, CommitteeSelection};

// === Internal Test Support ===
#[cfg(test)]
pub(crate) mod test_util;
