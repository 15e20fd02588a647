// Per-run state: configuration, progress, membership, rounds, events.
//
// SAFETY INVARIANTS:
// 1. All mutation flows through the engine operations (engine.rs); this
//    module only defines the state and its bookkeeping helpers
// 2. The event stream is append-only and totally ordered per run
// 3. phase_start is rewritten on every transition, so elapsed-time
//    checks are always relative to the current phase

use crate::config::RunConfig;
use crate::membership::MembershipLedger;
use crate::phase::Phase;
use crate::round::{Round, RoundRing, WitnessAttestation};
use log::{debug, info};
use plexus_core::{EventRecord, NodeId, RunEvent, RunId};
use serde::{Deserialize, Serialize};

/// Opaque model/checkpoint references, passed through to the storage
/// layer and never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub base_model: String,
    pub checkpoint: String,
    pub model_hash: String,
}

/// Epoch-level progress counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Completed-or-running epoch number; 0 before the first epoch
    pub epoch: u32,
    /// Global step count across all epochs
    pub step: u32,
    /// Data cursor at the start of the current epoch
    pub epoch_start_data_cursor: u64,
}

/// One training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    id: RunId,
    creator: NodeId,
    config: RunConfig,
    model: ModelDescriptor,

    phase: Phase,
    /// Unix seconds at which the current phase was entered
    phase_start: u64,

    pub(crate) progress: Progress,
    /// Data-stream position consumed so far
    pub(crate) data_cursor: u64,

    pub(crate) pending_pause: bool,
    pub(crate) cold_start_epoch: bool,

    pub(crate) membership: MembershipLedger,
    pub(crate) rounds: RoundRing,
    /// Bootstrap attestations collected during Warmup; they stand in
    /// for the "previous round" when height 0 is judged
    pub(crate) warmup_witnesses: Vec<WitnessAttestation>,

    /// Unix seconds at which the current epoch started training
    pub(crate) epoch_started_at: u64,
    /// Locked step ceiling for the current epoch, set at most once
    pub(crate) last_step: Option<u32>,

    events: Vec<EventRecord>,
    /// Rejects re-entrant mutation; sweep and eviction mutate
    /// collections in place
    #[serde(skip)]
    pub(crate) guard: bool,
}

impl Run {
    /// Build a run in WaitingForMembers. The caller (registry) has
    /// already validated the config and charged any creation fee.
    pub(crate) fn create(
        id: RunId,
        creator: NodeId,
        config: RunConfig,
        model: ModelDescriptor,
        now: u64,
    ) -> Self {
        let mut run = Run {
            id: id.clone(),
            creator,
            config,
            model,
            phase: Phase::Uninitialized,
            phase_start: now,
            progress: Progress::default(),
            data_cursor: 0,
            pending_pause: false,
            cold_start_epoch: false,
            membership: MembershipLedger::new(),
            rounds: RoundRing::new(),
            warmup_witnesses: Vec::new(),
            epoch_started_at: now,
            last_step: None,
            events: Vec::new(),
            guard: false,
        };
        run.emit(now, RunEvent::RunCreated { run_id: id.clone(), creator });
        let total_steps = run.config.total_steps;
        run.emit(now, RunEvent::RunConfigured { run_id: id, total_steps });
        run.enter_phase(Phase::WaitingForMembers, now);
        run
    }

    pub(crate) fn emit(&mut self, now: u64, event: RunEvent) {
        debug!("run {}: event {}", self.id, event.name());
        self.events.push(EventRecord {
            seq: self.events.len() as u64,
            timestamp: now,
            event,
        });
    }

    pub(crate) fn enter_phase(&mut self, new: Phase, now: u64) {
        let old = self.phase;
        self.phase = new;
        self.phase_start = now;
        info!("run {}: {} -> {} at {}", self.id, old, new, now);
        self.emit(
            now,
            RunEvent::StateTransition {
                old_phase: old.to_string(),
                new_phase: new.to_string(),
                at: now,
            },
        );
    }

    pub(crate) fn phase_elapsed(&self, now: u64) -> u64 {
        now.saturating_sub(self.phase_start)
    }

    /// Level-triggered timeout check: true from the moment the phase
    /// budget elapses until the phase changes, however late the caller.
    pub(crate) fn phase_timed_out(&self, now: u64) -> bool {
        match self.phase.timeout_secs(&self.config.timing) {
            Some(timeout) => self.phase_elapsed(now) >= timeout,
            None => false,
        }
    }

    /// Cursor the batch ramp is measured from. Cold-start epochs
    /// restart the ramp at the epoch's start cursor.
    pub(crate) fn ramp_cursor(&self) -> u64 {
        if self.cold_start_epoch {
            self.data_cursor
                .saturating_sub(self.progress.epoch_start_data_cursor)
        } else {
            self.data_cursor
        }
    }

    /// Attestation set judging the current round: the previous round's
    /// witnesses, or the Warmup bootstrap set for height 0.
    pub(crate) fn previous_attestations(&self) -> &[WitnessAttestation] {
        if self.rounds.current_height() == 0 {
            &self.warmup_witnesses
        } else {
            self.rounds
                .previous()
                .map(|r| r.witnesses.as_slice())
                .unwrap_or(&[])
        }
    }

    // --- read-only surface ---

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn creator(&self) -> &NodeId {
        &self.creator
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    pub(crate) fn model_mut(&mut self) -> &mut ModelDescriptor {
        &mut self.model
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn data_cursor(&self) -> u64 {
        self.data_cursor
    }

    pub fn pending_pause(&self) -> bool {
        self.pending_pause
    }

    pub fn cold_start_epoch(&self) -> bool {
        self.cold_start_epoch
    }

    pub fn membership(&self) -> &MembershipLedger {
        &self.membership
    }

    pub fn active_count(&self) -> u16 {
        self.membership.active_count()
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.rounds.current()
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }
}
