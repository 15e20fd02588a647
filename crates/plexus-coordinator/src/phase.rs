// Run phases - the closed state set of the transition engine.
//
// SAFETY INVARIANTS:
// 1. The set of phases is closed; the engine matches exhaustively
// 2. Every non-terminal, non-waiting-on-humans phase has a timeout, so
//    a tick loop alone is sufficient to drive any run to completion
// 3. Phase timeouts are pure functions of the immutable run config

use crate::config::RunTiming;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinator phase for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Run object exists but creation has not completed
    Uninitialized,

    /// Collecting join requests until quorum of pending members + grace
    WaitingForMembers,

    /// Admitted members connect to each other and warm caches
    Warmup,

    /// A round is in flight; participants train and witnesses attest
    RoundTrain,

    /// Witness window: attestations settle before the round is judged
    RoundWitness,

    /// Epoch boundary: checkpoints settle, pause/finish are honored
    Cooldown,

    /// Halted by the creator; resumable
    Paused,

    /// Terminal: the configured step target was reached
    Finished,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Uninitialized => "UNINITIALIZED",
            Phase::WaitingForMembers => "WAITING_FOR_MEMBERS",
            Phase::Warmup => "WARMUP",
            Phase::RoundTrain => "ROUND_TRAIN",
            Phase::RoundWitness => "ROUND_WITNESS",
            Phase::Cooldown => "COOLDOWN",
            Phase::Paused => "PAUSED",
            Phase::Finished => "FINISHED",
        }
    }

    /// Seconds this phase is allowed to run before `tick` acts.
    /// `None` means the phase only exits on an explicit operation.
    pub fn timeout_secs(&self, timing: &RunTiming) -> Option<u64> {
        match self {
            Phase::WaitingForMembers => Some(timing.member_grace_secs),
            Phase::Warmup => Some(timing.warmup_secs),
            Phase::RoundTrain => Some(timing.round_train_secs),
            Phase::RoundWitness => Some(timing.round_witness_secs),
            Phase::Cooldown => Some(timing.cooldown_secs),
            Phase::Uninitialized | Phase::Paused | Phase::Finished => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Finished)
    }

    /// Idle phases admit immediate pause; mid-epoch phases defer it.
    pub fn is_idle(&self) -> bool {
        matches!(self, Phase::WaitingForMembers | Phase::Warmup)
    }

    /// Phases during which an epoch is in flight.
    pub fn is_mid_epoch(&self) -> bool {
        matches!(self, Phase::RoundTrain | Phase::RoundWitness | Phase::Cooldown)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
