// Run registry: the only shared mutable surface of the coordinator.
//
// SAFETY INVARIANTS:
// 1. Run state lives in an index-addressed arena; handles stay stable
//    for the life of the registry and runs are never deleted
// 2. The active-id list supports O(1) swap-remove when a run finishes
// 3. Every mutating operation holds the per-run re-entrancy guard for
//    its full duration; sweep and eviction mutate collections in place
//    and must never be re-entered

use crate::config::RunConfig;
use crate::engine::TickOutcome;
use crate::error::{CoordinatorError, Result};
use crate::phase::Phase;
use crate::providers::Providers;
use crate::run::{ModelDescriptor, Run};
use log::info;
use parking_lot::Mutex;
use plexus_core::{BloomFilter, NodeId, RunId};
use std::collections::HashMap;
use std::sync::Arc;

/// A coordinator shared across threads by an external driver loop.
pub type SharedCoordinator = Arc<Mutex<Coordinator>>;

/// Registry of independent run state machines.
///
/// Call-at-a-time semantics per run: every operation executes to
/// completion atomically with respect to that run's state. Operations
/// on different runs never contend on anything but this registry.
pub struct Coordinator {
    runs: Vec<Run>,
    index: HashMap<RunId, usize>,
    active_ids: Vec<RunId>,
    active_pos: HashMap<RunId, usize>,
    providers: Providers,
}

impl Coordinator {
    pub fn new(providers: Providers) -> Self {
        Coordinator {
            runs: Vec::new(),
            index: HashMap::new(),
            active_ids: Vec::new(),
            active_pos: HashMap::new(),
            providers,
        }
    }

    /// Registry with fully open collaborators.
    pub fn with_open_providers() -> Self {
        Self::new(Providers::open())
    }

    pub fn into_shared(self) -> SharedCoordinator {
        Arc::new(Mutex::new(self))
    }

    /// Create a run in WaitingForMembers. Validates the config, charges
    /// the optional creation fee, and registers the run as active.
    pub fn create_run(
        &mut self,
        id: RunId,
        creator: NodeId,
        config: RunConfig,
        model: ModelDescriptor,
        now: u64,
    ) -> Result<()> {
        if self.index.contains_key(&id) {
            return Err(CoordinatorError::DuplicateRun(id));
        }
        config.validate()?;

        if config.fee > 0 {
            // validate() guarantees a recipient when fee > 0.
            let recipient = config.fee_recipient.as_deref().unwrap_or_default();
            self.providers
                .fee_collector
                .charge(&creator, recipient, config.fee)
                .map_err(CoordinatorError::FeeRejected)?;
        }

        info!("creating run {} for {}", id, creator);
        let run = Run::create(id.clone(), creator, config, model, now);
        let slot = self.runs.len();
        self.index.insert(id.clone(), slot);
        self.active_pos.insert(id.clone(), self.active_ids.len());
        self.active_ids.push(id);
        self.runs.push(run);
        Ok(())
    }

    /// The permissionless driver operation: evaluate timeouts for one
    /// run and perform at most one transition.
    pub fn tick(&mut self, id: &RunId, now: u64) -> Result<Option<TickOutcome>> {
        let beacon = self.providers.randomness.beacon();
        let outcome = self.with_run_mut(id, |run| Ok(run.tick(now, beacon)))?;
        if let Some(outcome) = outcome {
            if outcome.new_phase == Phase::Finished {
                self.remove_from_active(id);
            }
        }
        Ok(outcome)
    }

    /// Queue a join request, gated by provider eligibility and, for
    /// private runs, the access-control collaborator.
    pub fn request_join(
        &mut self,
        id: &RunId,
        identity: NodeId,
        endpoint: String,
        now: u64,
    ) -> Result<()> {
        if !self.providers.provider_registry.is_eligible(&identity) {
            return Err(CoordinatorError::NotEligible(identity));
        }
        let key_ref = {
            let run = self.run(id)?;
            match &run.config().privacy {
                crate::config::RunPrivacy::Private { key_ref } => Some(key_ref.clone()),
                crate::config::RunPrivacy::Public => None,
            }
        };
        if let Some(key_ref) = key_ref {
            let (allowed, info) = self
                .providers
                .access_control
                .check_access(&key_ref, &identity);
            if !allowed {
                return Err(CoordinatorError::AccessDenied { identity, info });
            }
        }
        self.with_run_mut(id, |run| run.request_join(identity, endpoint, now))
    }

    pub fn withdraw(&mut self, id: &RunId, identity: &NodeId) -> Result<()> {
        self.with_run_mut(id, |run| run.withdraw(identity))
    }

    /// Record a witness attestation; may close the phase early.
    pub fn submit_witness(
        &mut self,
        id: &RunId,
        submitter: NodeId,
        height: u32,
        participant_bloom: BloomFilter,
        tokens_per_sec: u64,
        now: u64,
    ) -> Result<Option<TickOutcome>> {
        let beacon = self.providers.randomness.beacon();
        self.with_run_mut(id, |run| {
            run.submit_witness(submitter, height, participant_bloom, tokens_per_sec, now, beacon)
        })
    }

    /// Report suspect slots for the current round.
    pub fn submit_health_report(
        &mut self,
        id: &RunId,
        reporter: NodeId,
        height: u32,
        slots: &[u16],
        now: u64,
    ) -> Result<()> {
        self.with_run_mut(id, |run| run.submit_health_report(reporter, height, slots, now))
    }

    pub fn pause_run(
        &mut self,
        id: &RunId,
        caller: &NodeId,
        now: u64,
    ) -> Result<Option<TickOutcome>> {
        self.with_run_mut(id, |run| run.pause(caller, now))
    }

    pub fn resume_run(&mut self, id: &RunId, caller: &NodeId, now: u64) -> Result<TickOutcome> {
        self.with_run_mut(id, |run| run.resume(caller, now))
    }

    pub fn update_checkpoint(
        &mut self,
        id: &RunId,
        caller: &NodeId,
        checkpoint: String,
        now: u64,
    ) -> Result<()> {
        self.with_run_mut(id, |run| run.update_checkpoint(caller, checkpoint, now))
    }

    // --- read-only surface ---

    pub fn run(&self, id: &RunId) -> Result<&Run> {
        let slot = self
            .index
            .get(id)
            .ok_or_else(|| CoordinatorError::RunNotFound(id.clone()))?;
        Ok(&self.runs[*slot])
    }

    /// Identifiers of runs that have not finished.
    pub fn active_runs(&self) -> &[RunId] {
        &self.active_ids
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    // --- internals ---

    fn with_run_mut<T>(&mut self, id: &RunId, f: impl FnOnce(&mut Run) -> Result<T>) -> Result<T> {
        let slot = self
            .index
            .get(id)
            .ok_or_else(|| CoordinatorError::RunNotFound(id.clone()))?;
        let run = &mut self.runs[*slot];
        if run.guard {
            return Err(CoordinatorError::Reentrancy);
        }
        run.guard = true;
        let result = f(run);
        run.guard = false;
        result
    }

    fn remove_from_active(&mut self, id: &RunId) {
        if let Some(pos) = self.active_pos.remove(id) {
            self.active_ids.swap_remove(pos);
            if pos < self.active_ids.len() {
                let moved = self.active_ids[pos].clone();
                self.active_pos.insert(moved, pos);
            }
        }
    }
}
