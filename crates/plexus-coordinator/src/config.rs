// Run configuration - immutable after creation, validated once.
//
// SAFETY INVARIANTS:
// 1. A config that passes validate() can never wedge the state machine:
//    all timeouts are positive and membership bounds are satisfiable
// 2. Limits are hard protocol constants, not tunables: health checks
//    are sized for MAX_CLIENTS participants and MAX_WITNESSES attestors

use crate::error::{CoordinatorError, Result};
use serde::{Deserialize, Serialize};

/// Hard cap on admitted participants per run.
pub const MAX_CLIENTS: u16 = 256;

/// Hard cap on the witness committee; also the fallback committee size
/// when `witness_nodes` is left unset (0).
pub const MAX_WITNESSES: u16 = 32;

/// Rounds kept in the per-run ring buffer. The health lookback needs
/// the previous round only; the extra slots absorb late readers.
pub const ROUND_RING_SIZE: usize = 4;

/// Grace rounds granted after the epoch time budget is exhausted.
/// Preserved verbatim from the protocol; downstream timing depends on it.
pub const LAST_STEP_GRACE_ROUNDS: u32 = 2;

/// Nominal false-positive rate for participation bloom filters.
pub const BLOOM_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Phase timeouts, in seconds of externally supplied unix time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTiming {
    /// Minimum time WaitingForMembers holds before Warmup can start
    pub member_grace_secs: u64,
    /// Warmup duration (connection building, cache warming)
    pub warmup_secs: u64,
    /// Maximum wall time for one training round
    pub round_train_secs: u64,
    /// Witness attestation window after each round
    pub round_witness_secs: u64,
    /// Cooldown duration at each epoch boundary
    pub cooldown_secs: u64,
    /// Epoch time budget; once exceeded, the last-step ceiling locks in
    pub epoch_secs: u64,
}

/// Batch-size ramp over cumulative processed tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRamp {
    pub batch_size_start: u32,
    pub batch_size_end: u32,
    /// Token threshold at which the ramp reaches batch_size_end
    pub warmup_tokens: u64,
    /// Tokens per data-cursor unit (sequence length)
    pub max_seq_len: u32,
}

/// Run visibility. Private runs gate joins through the access-control
/// collaborator using the stored key reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPrivacy {
    Public,
    Private { key_ref: String },
}

impl RunPrivacy {
    pub fn is_private(&self) -> bool {
        matches!(self, RunPrivacy::Private { .. })
    }
}

/// Complete run configuration, set once at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Minimum active members for an epoch to continue
    pub min_clients: u16,
    /// Pending members required before the first Warmup starts
    pub init_min_clients: u16,
    /// Admission capacity; joins beyond it are silently truncated
    pub max_clients: u16,
    /// Fixed witness committee size; 0 selects min(active, MAX_WITNESSES)
    pub witness_nodes: u16,
    /// Global step target; the run finishes when progress reaches it
    pub total_steps: u32,
    pub timing: RunTiming,
    pub batch: BatchRamp,
    pub privacy: RunPrivacy,
    /// Creation fee, charged through the fee collaborator; 0 disables
    pub fee: u64,
    /// Opaque account reference receiving the creation fee
    pub fee_recipient: Option<String>,
}

impl RunConfig {
    /// Check internal consistency. Called once at run creation; a run
    /// never re-validates because the config is immutable afterwards.
    pub fn validate(&self) -> Result<()> {
        if self.total_steps == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "total_steps must be > 0".to_string(),
            ));
        }
        if self.min_clients == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "min_clients must be > 0".to_string(),
            ));
        }
        if self.init_min_clients < self.min_clients {
            return Err(CoordinatorError::InvalidConfig(format!(
                "init_min_clients {} is below min_clients {}",
                self.init_min_clients, self.min_clients
            )));
        }
        if self.max_clients < self.init_min_clients {
            return Err(CoordinatorError::InvalidConfig(format!(
                "max_clients {} is below init_min_clients {}",
                self.max_clients, self.init_min_clients
            )));
        }
        if self.max_clients > MAX_CLIENTS {
            return Err(CoordinatorError::InvalidConfig(format!(
                "max_clients {} exceeds protocol cap {}",
                self.max_clients, MAX_CLIENTS
            )));
        }
        if self.witness_nodes > self.min_clients {
            return Err(CoordinatorError::InvalidConfig(format!(
                "witness_nodes {} exceeds min_clients {}",
                self.witness_nodes, self.min_clients
            )));
        }
        if self.witness_nodes > MAX_WITNESSES {
            return Err(CoordinatorError::InvalidConfig(format!(
                "witness_nodes {} exceeds protocol cap {}",
                self.witness_nodes, MAX_WITNESSES
            )));
        }

        let t = &self.timing;
        for (name, value) in [
            ("member_grace_secs", t.member_grace_secs),
            ("warmup_secs", t.warmup_secs),
            ("round_train_secs", t.round_train_secs),
            ("round_witness_secs", t.round_witness_secs),
            ("cooldown_secs", t.cooldown_secs),
            ("epoch_secs", t.epoch_secs),
        ] {
            if value == 0 {
                return Err(CoordinatorError::InvalidConfig(format!(
                    "{} must be > 0",
                    name
                )));
            }
        }

        if self.batch.batch_size_start == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "batch_size_start must be > 0".to_string(),
            ));
        }
        if self.batch.batch_size_end < self.batch.batch_size_start {
            return Err(CoordinatorError::InvalidConfig(format!(
                "batch_size_end {} is below batch_size_start {}",
                self.batch.batch_size_end, self.batch.batch_size_start
            )));
        }
        if self.batch.max_seq_len == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "max_seq_len must be > 0".to_string(),
            ));
        }

        if self.fee > 0 && self.fee_recipient.is_none() {
            return Err(CoordinatorError::InvalidConfig(
                "fee requires a fee_recipient".to_string(),
            ));
        }

        Ok(())
    }
}
