// Shared fixtures for unit and integration tests.

use crate::config::{BatchRamp, RunConfig, RunPrivacy, RunTiming};
use crate::run::ModelDescriptor;
use plexus_core::NodeId;

pub fn node(i: u32) -> NodeId {
    NodeId::derive(format!("node-{}", i).as_bytes())
}

pub fn model() -> ModelDescriptor {
    ModelDescriptor {
        base_model: "base-7b".to_string(),
        checkpoint: "ckpt-0".to_string(),
        model_hash: "deadbeef".to_string(),
    }
}

/// A consistent, validated config: 4..=16 members, committee of 3,
/// 100 steps, short timeouts for tick-driven tests.
pub fn valid_config() -> RunConfig {
    RunConfig {
        min_clients: 4,
        init_min_clients: 5,
        max_clients: 16,
        witness_nodes: 3,
        total_steps: 100,
        timing: RunTiming {
            member_grace_secs: 10,
            warmup_secs: 30,
            round_train_secs: 60,
            round_witness_secs: 20,
            cooldown_secs: 15,
            epoch_secs: 900,
        },
        batch: BatchRamp {
            batch_size_start: 8,
            batch_size_end: 64,
            warmup_tokens: 1_000_000,
            max_seq_len: 2048,
        },
        privacy: RunPrivacy::Public,
        fee: 0,
        fee_recipient: None,
    }
}
