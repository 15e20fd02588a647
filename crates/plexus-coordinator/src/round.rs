// Round state and the fixed-size ring of recent rounds.
//
// SAFETY INVARIANTS:
// 1. Heights strictly increase within an epoch and reset to 0 at epoch
//    start; the ring is cleared on reset so stale rounds never leak
//    across epochs
// 2. Only the most recent ROUND_RING_SIZE rounds are retained; the
//    health lookback reads exactly one round back
// 3. The random seed is committee-sampling grade: derived from the
//    beacon, run identity, and height, not from any local entropy

use crate::config::ROUND_RING_SIZE;
use plexus_core::{BloomFilter, NodeId, RunId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A participation summary from one committee member for one height.
/// Immutable once stored; at most one per (submitter, height).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessAttestation {
    pub submitter: NodeId,
    pub height: u32,
    /// Participants the submitter observed as live during the round
    pub participant_bloom: BloomFilter,
    /// Opaque throughput metric, passed through to scoring collaborators
    pub tokens_per_sec: u64,
    /// Unix seconds of submission
    pub submitted_at: u64,
}

/// One training round within an epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    /// Epoch-scoped height, starting at 0
    pub height: u32,
    /// Data-stream position consumed before this round
    pub data_cursor: u64,
    pub random_seed: [u8; 32],
    /// Active membership snapshot when the round started; committee
    /// checks use this snapshot so mid-round flags cannot shift it
    pub participant_count_at_start: u16,
    pub tie_breaker: u64,
    pub witnesses: Vec<WitnessAttestation>,
}

impl Round {
    pub fn new(
        height: u32,
        data_cursor: u64,
        random_seed: [u8; 32],
        participant_count_at_start: u16,
    ) -> Self {
        Round {
            height,
            data_cursor,
            random_seed,
            participant_count_at_start,
            tie_breaker: tie_breaker_from_seed(&random_seed),
            witnesses: Vec::new(),
        }
    }
}

/// Derive a round seed from the randomness beacon, run identity, and
/// height. Re-derivable by anyone observing the same inputs.
pub fn derive_round_seed(beacon: u64, run_id: &RunId, height: u32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(beacon.to_le_bytes());
    hasher.update(run_id.as_str().as_bytes());
    hasher.update(height.to_le_bytes());
    hasher.finalize().into()
}

fn tie_breaker_from_seed(seed: &[u8; 32]) -> u64 {
    u64::from_le_bytes(seed[24..32].try_into().unwrap())
}

/// Ring buffer of the most recent rounds of the current epoch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundRing {
    rounds: Vec<Round>,
    current_height: u32,
}

impl RoundRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all rounds; called at epoch start before height 0 begins.
    pub fn reset(&mut self) {
        self.rounds.clear();
        self.current_height = 0;
    }

    /// Install `round` as the current round, overwriting the slot it
    /// hashes to once the ring is full.
    pub fn begin(&mut self, round: Round) {
        self.current_height = round.height;
        let slot = round.height as usize % ROUND_RING_SIZE;
        if slot < self.rounds.len() {
            self.rounds[slot] = round;
        } else {
            self.rounds.push(round);
        }
    }

    pub fn current_height(&self) -> u32 {
        self.current_height
    }

    pub fn current(&self) -> Option<&Round> {
        self.round_at(self.current_height)
    }

    pub fn current_mut(&mut self) -> Option<&mut Round> {
        let height = self.current_height;
        let slot = height as usize % ROUND_RING_SIZE;
        self.rounds.get_mut(slot).filter(|r| r.height == height)
    }

    /// The round one height back, if still retained.
    pub fn previous(&self) -> Option<&Round> {
        if self.rounds.is_empty() || self.current_height == 0 {
            return None;
        }
        self.round_at(self.current_height - 1)
    }

    fn round_at(&self, height: u32) -> Option<&Round> {
        let slot = height as usize % ROUND_RING_SIZE;
        self.rounds.get(slot).filter(|r| r.height == height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_id() -> RunId {
        RunId::from("run-ring")
    }

    fn round(height: u32) -> Round {
        let seed = derive_round_seed(42, &run_id(), height);
        Round::new(height, height as u64 * 10, seed, 5)
    }

    #[test]
    fn test_seed_depends_on_all_inputs() {
        let base = derive_round_seed(1, &run_id(), 0);
        assert_ne!(base, derive_round_seed(2, &run_id(), 0));
        assert_ne!(base, derive_round_seed(1, &RunId::from("other"), 0));
        assert_ne!(base, derive_round_seed(1, &run_id(), 1));
        assert_eq!(base, derive_round_seed(1, &run_id(), 0));
    }

    #[test]
    fn test_empty_ring_has_no_rounds() {
        let ring = RoundRing::new();
        assert!(ring.current().is_none());
        assert!(ring.previous().is_none());
    }

    #[test]
    fn test_current_and_previous_track_heights() {
        let mut ring = RoundRing::new();
        ring.begin(round(0));
        assert_eq!(ring.current().unwrap().height, 0);
        assert!(ring.previous().is_none());

        ring.begin(round(1));
        assert_eq!(ring.current().unwrap().height, 1);
        assert_eq!(ring.previous().unwrap().height, 0);
    }

    #[test]
    fn test_ring_overwrites_old_rounds() {
        let mut ring = RoundRing::new();
        for h in 0..6 {
            ring.begin(round(h));
        }
        assert_eq!(ring.current().unwrap().height, 5);
        assert_eq!(ring.previous().unwrap().height, 4);
        // Height 1 occupied slot 1, overwritten by height 5.
        assert!(ring.round_at(1).is_none());
    }

    #[test]
    fn test_reset_clears_prior_epoch() {
        let mut ring = RoundRing::new();
        for h in 0..3 {
            ring.begin(round(h));
        }
        ring.reset();
        assert!(ring.current().is_none());
        assert!(ring.previous().is_none());
        ring.begin(round(0));
        assert_eq!(ring.current().unwrap().height, 0);
    }

    #[test]
    fn test_tie_breaker_is_seed_derived() {
        let a = round(3);
        let b = round(3);
        assert_eq!(a.tie_breaker, b.tie_breaker);
        assert_ne!(round(3).tie_breaker, round(4).tie_breaker);
    }
}
