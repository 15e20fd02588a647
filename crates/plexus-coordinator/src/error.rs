// Error taxonomy for coordinator operations.
//
// Every rejection is synchronous and atomic: an operation that returns
// an error has made no state change. Variants carry enough context for
// callers to decide between retrying later (InvalidPhase), giving up
// (NotAuthorized, Duplicate*), or escalating (InvalidConfig).

use crate::phase::Phase;
use plexus_core::{NodeId, RunId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinatorError {
    #[error("run {0} not found")]
    RunNotFound(RunId),

    #[error("run {0} already exists")]
    DuplicateRun(RunId),

    #[error("{0} is not an active member of this run")]
    MemberNotFound(NodeId),

    #[error("operation requires phase {expected}, run is in {actual}")]
    InvalidPhase {
        expected: &'static str,
        actual: Phase,
    },

    #[error("caller {caller} is not authorized: requires {required}")]
    NotAuthorized {
        caller: NodeId,
        required: &'static str,
    },

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} already joined this run")]
    DuplicateJoin(NodeId),

    #[error("witness for height {height} already submitted by {submitter}")]
    DuplicateWitness { submitter: NodeId, height: u32 },

    #[error("slot {slot} is not in the witness committee for height {height}")]
    NotInCommittee { slot: u16, height: u32 },

    #[error("{0} is not an eligible compute provider")]
    NotEligible(NodeId),

    #[error("access denied for {identity}: {info}")]
    AccessDenied { identity: NodeId, info: String },

    #[error("creation fee could not be charged: {0}")]
    FeeRejected(String),

    #[error("health report rejected: slot {slot} is confirmed healthy")]
    HealthCheckRejected { slot: u16 },

    #[error("slot {slot} is out of range for the active set")]
    SlotOutOfRange { slot: u16 },

    #[error("witness height {got} does not match the current round height {current}")]
    HeightMismatch { got: u32, current: u32 },

    #[error("re-entrant mutation rejected")]
    Reentrancy,

    #[error("no active round in the current phase")]
    NoActiveRound,
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
