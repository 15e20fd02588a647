// Run event stream - the primary integration surface.
//
// Events are append-only and totally ordered per run. Downstream
// collaborators (reward accounting, node performance scoring,
// dashboards) consume this stream instead of calling into the
// coordinator synchronously.

use crate::bloom::BloomFilter;
use crate::identity::{NodeId, RunId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a participant left the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Flagged unhealthy by a quorum-validated health report
    Dropped,
    /// Self-requested exit
    Withdrawn,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Dropped => write!(f, "DROPPED"),
            ExitReason::Withdrawn => write!(f, "WITHDRAWN"),
        }
    }
}

/// One event in a run's append-only stream.
///
/// Phase names are carried as their display strings so that consumers
/// do not need the coordinator crate on their dependency path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunEvent {
    RunCreated {
        run_id: RunId,
        creator: NodeId,
    },
    RunConfigured {
        run_id: RunId,
        total_steps: u32,
    },
    StateTransition {
        old_phase: String,
        new_phase: String,
        at: u64,
    },
    RoundStarted {
        height: u32,
        data_cursor: u64,
        seed_hex: String,
        batch_size: u32,
    },
    WitnessSubmitted {
        submitter: NodeId,
        height: u32,
        bloom: BloomFilter,
        tokens_per_sec: u64,
    },
    ClientExited {
        identity: NodeId,
        reason: ExitReason,
        at_height: u32,
    },
    EpochCompleted {
        epoch: u32,
        steps_in_epoch: u32,
    },
    CheckpointUpdated {
        checkpoint: String,
    },
    RunPaused,
    RunResumed,
    RunFinished {
        total_steps: u32,
    },
}

impl RunEvent {
    /// Stable name for metrics and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::RunCreated { .. } => "run_created",
            RunEvent::RunConfigured { .. } => "run_configured",
            RunEvent::StateTransition { .. } => "state_transition",
            RunEvent::RoundStarted { .. } => "round_started",
            RunEvent::WitnessSubmitted { .. } => "witness_submitted",
            RunEvent::ClientExited { .. } => "client_exited",
            RunEvent::EpochCompleted { .. } => "epoch_completed",
            RunEvent::CheckpointUpdated { .. } => "checkpoint_updated",
            RunEvent::RunPaused => "run_paused",
            RunEvent::RunResumed => "run_resumed",
            RunEvent::RunFinished { .. } => "run_finished",
        }
    }
}

/// An event with its position and wall-clock time of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the run's stream, starting at 0
    pub seq: u64,
    /// Unix seconds at which the event was recorded
    pub timestamp: u64,
    pub event: RunEvent,
}
