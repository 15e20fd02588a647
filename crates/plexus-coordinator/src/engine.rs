// Phase transition engine - the single decision point for run progress.
//
// SAFETY INVARIANTS:
// 1. tick performs at most one phase transition per call and is a
//    cheap no-op before the current phase's timeout elapses
// 2. All timing is level-triggered: an arbitrarily late tick observes
//    the same state a punctual one would have
// 3. The unhealthy sweep runs before every transition that changes the
//    round height or ends an epoch, never in the middle of a round
// 4. An epoch with zero witness attestations is force-ended, so every
//    epoch terminates even under total participant loss

use crate::batch_schedule::target_batch_size;
use crate::config::LAST_STEP_GRACE_ROUNDS;
use crate::error::{CoordinatorError, Result};
use crate::phase::Phase;
use crate::round::{derive_round_seed, Round, WitnessAttestation};
use crate::run::Run;
use crate::witness::{
    effective_committee_size, is_confirmed_healthy, witness_quorum, CommitteeSelection,
};
use log::{debug, info, warn};
use plexus_core::{BloomFilter, NodeId, RunEvent};

/// Result of a tick that performed a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub old_phase: Phase,
    pub new_phase: Phase,
}

impl Run {
    /// Evaluate elapsed time and perform at most one transition.
    ///
    /// Permissionless: any caller may drive any run. `now` is the
    /// caller-observed unix time; `beacon` is recent chain randomness
    /// used only when a new round's seed must be derived.
    pub fn tick(&mut self, now: u64, beacon: u64) -> Option<TickOutcome> {
        match self.phase() {
            Phase::Uninitialized | Phase::Paused | Phase::Finished => None,
            Phase::WaitingForMembers => {
                if !self.phase_timed_out(now) {
                    return None;
                }
                let members = self.membership.active_count() + self.membership.pending_count();
                if members < self.config().init_min_clients {
                    debug!(
                        "run {}: grace elapsed but only {} members (need {})",
                        self.id(),
                        members,
                        self.config().init_min_clients
                    );
                    return None;
                }
                Some(self.begin_warmup(now))
            }
            Phase::Warmup => {
                if !self.phase_timed_out(now) {
                    return None;
                }
                Some(self.finish_warmup(now, beacon))
            }
            Phase::RoundTrain => {
                if !self.phase_timed_out(now) {
                    return None;
                }
                Some(self.transition(Phase::RoundWitness, now))
            }
            Phase::RoundWitness => {
                if !self.phase_timed_out(now) {
                    return None;
                }
                Some(self.judge_round(now, beacon))
            }
            Phase::Cooldown => {
                if !self.phase_timed_out(now) {
                    return None;
                }
                Some(self.leave_cooldown(now))
            }
        }
    }

    // --- mutation operations -------------------------------------------------

    /// Queue a join request. Provider eligibility and private-run
    /// access have already been checked by the registry.
    pub(crate) fn request_join(
        &mut self,
        identity: NodeId,
        endpoint: String,
        now: u64,
    ) -> Result<()> {
        if !self.phase().is_idle() {
            return Err(CoordinatorError::InvalidPhase {
                expected: "WAITING_FOR_MEMBERS or WARMUP",
                actual: self.phase(),
            });
        }
        self.membership.request_join(identity, endpoint, now)?;
        debug!("run {}: join request from {}", self.id(), identity);
        Ok(())
    }

    /// Self-service exit; honored at the next unhealthy sweep.
    pub(crate) fn withdraw(&mut self, identity: &NodeId) -> Result<()> {
        self.membership.withdraw(identity)?;
        info!("run {}: {} requested withdrawal", self.id(), identity);
        Ok(())
    }

    /// Record a witness attestation for `height`.
    ///
    /// During RoundTrain the submitter must pass the committee check;
    /// during Warmup attestations bootstrap the first round and skip
    /// it. Reaching the expected witness count ends the phase early.
    pub(crate) fn submit_witness(
        &mut self,
        submitter: NodeId,
        height: u32,
        participant_bloom: BloomFilter,
        tokens_per_sec: u64,
        now: u64,
        beacon: u64,
    ) -> Result<Option<TickOutcome>> {
        let slot = self.membership.slot_of(&submitter);
        if slot == 0 {
            return Err(CoordinatorError::MemberNotFound(submitter));
        }

        match self.phase() {
            Phase::Warmup => {
                if self.warmup_witnesses.iter().any(|a| a.submitter == submitter) {
                    return Err(CoordinatorError::DuplicateWitness { submitter, height });
                }
                self.warmup_witnesses.push(WitnessAttestation {
                    submitter,
                    height: 0,
                    participant_bloom: participant_bloom.clone(),
                    tokens_per_sec,
                    submitted_at: now,
                });
                self.emit(
                    now,
                    RunEvent::WitnessSubmitted {
                        submitter,
                        height: 0,
                        bloom: participant_bloom,
                        tokens_per_sec,
                    },
                );

                let expected = effective_committee_size(
                    self.membership.active_count(),
                    self.config().witness_nodes,
                );
                if self.warmup_witnesses.len() as u16 >= expected
                    && self.membership.active_count() >= self.config().min_clients
                {
                    debug!(
                        "run {}: warmup attestation quota reached, starting epoch early",
                        self.id()
                    );
                    return Ok(Some(self.finish_warmup(now, beacon)));
                }
                Ok(None)
            }
            Phase::RoundTrain => {
                let round = self.current_round().ok_or(CoordinatorError::NoActiveRound)?;
                if height != round.height {
                    return Err(CoordinatorError::HeightMismatch {
                        got: height,
                        current: round.height,
                    });
                }
                let selection = CommitteeSelection::new(
                    round.random_seed,
                    round.participant_count_at_start,
                    self.config().witness_nodes,
                );
                if !selection.is_witness(slot) {
                    return Err(CoordinatorError::NotInCommittee { slot, height });
                }
                if round.witnesses.iter().any(|a| a.submitter == submitter) {
                    return Err(CoordinatorError::DuplicateWitness { submitter, height });
                }
                let expected = selection.expected_witnesses();

                let attestation = WitnessAttestation {
                    submitter,
                    height,
                    participant_bloom: participant_bloom.clone(),
                    tokens_per_sec,
                    submitted_at: now,
                };
                let round = self
                    .rounds
                    .current_mut()
                    .ok_or(CoordinatorError::NoActiveRound)?;
                round.witnesses.push(attestation);
                let witness_count = round.witnesses.len() as u16;
                self.emit(
                    now,
                    RunEvent::WitnessSubmitted {
                        submitter,
                        height,
                        bloom: participant_bloom,
                        tokens_per_sec,
                    },
                );

                if witness_count >= expected {
                    debug!(
                        "run {}: height {} reached expected witness count {} early",
                        self.id(),
                        height,
                        expected
                    );
                    return Ok(Some(self.transition(Phase::RoundWitness, now)));
                }
                Ok(None)
            }
            actual => Err(CoordinatorError::InvalidPhase {
                expected: "ROUND_TRAIN or WARMUP",
                actual,
            }),
        }
    }

    /// Flag the given active slots as unhealthy for `height`.
    ///
    /// Callable by anyone, but each flag is honored only if the bloom
    /// health test fails to confirm the target; validation runs over
    /// the whole report before any flag lands, so the operation is
    /// atomic.
    pub(crate) fn submit_health_report(
        &mut self,
        reporter: NodeId,
        height: u32,
        slots: &[u16],
        now: u64,
    ) -> Result<()> {
        if !matches!(self.phase(), Phase::RoundTrain | Phase::RoundWitness) {
            return Err(CoordinatorError::InvalidPhase {
                expected: "ROUND_TRAIN or ROUND_WITNESS",
                actual: self.phase(),
            });
        }
        let current = self.current_round().ok_or(CoordinatorError::NoActiveRound)?;
        if height != current.height {
            return Err(CoordinatorError::HeightMismatch {
                got: height,
                current: current.height,
            });
        }

        let previous = self.previous_attestations();
        for &slot in slots {
            let participant = self
                .membership
                .participant_by_slot(slot)
                .ok_or(CoordinatorError::SlotOutOfRange { slot })?;
            if is_confirmed_healthy(previous, &participant.id) {
                return Err(CoordinatorError::HealthCheckRejected { slot });
            }
        }
        for &slot in slots {
            self.membership.flag_dropped(slot)?;
        }
        warn!(
            "run {}: {} flagged {} unhealthy slot(s) at height {} ({})",
            self.id(),
            reporter,
            slots.len(),
            height,
            now
        );
        Ok(())
    }

    /// Request a halt. Immediate in idle phases; deferred to the next
    /// Cooldown while an epoch is in flight.
    pub(crate) fn pause(&mut self, caller: &NodeId, now: u64) -> Result<Option<TickOutcome>> {
        self.require_creator(caller)?;
        match self.phase() {
            Phase::Paused | Phase::Finished | Phase::Uninitialized => {
                Err(CoordinatorError::InvalidPhase {
                    expected: "an active phase",
                    actual: self.phase(),
                })
            }
            phase if phase.is_idle() => {
                self.emit(now, RunEvent::RunPaused);
                self.cold_start_epoch = true;
                Ok(Some(self.transition(Phase::Paused, now)))
            }
            _ => {
                // Mid-epoch: cooperative, honored at the next Cooldown.
                self.pending_pause = true;
                info!("run {}: pause requested, deferred to cooldown", self.id());
                Ok(None)
            }
        }
    }

    /// Resume a paused run into member collection.
    pub(crate) fn resume(&mut self, caller: &NodeId, now: u64) -> Result<TickOutcome> {
        self.require_creator(caller)?;
        if self.phase() != Phase::Paused {
            return Err(CoordinatorError::InvalidPhase {
                expected: "PAUSED",
                actual: self.phase(),
            });
        }
        self.emit(now, RunEvent::RunResumed);
        Ok(self.transition(Phase::WaitingForMembers, now))
    }

    /// Update the opaque checkpoint reference. Creator or any active
    /// member, while no round is in flight.
    pub(crate) fn update_checkpoint(
        &mut self,
        caller: &NodeId,
        checkpoint: String,
        now: u64,
    ) -> Result<()> {
        if caller != self.creator() && !self.membership.is_active(caller) {
            return Err(CoordinatorError::NotAuthorized {
                caller: *caller,
                required: "run creator or active member",
            });
        }
        if !matches!(self.phase(), Phase::Cooldown | Phase::Paused) {
            return Err(CoordinatorError::InvalidPhase {
                expected: "COOLDOWN or PAUSED",
                actual: self.phase(),
            });
        }
        self.model_mut().checkpoint = checkpoint.clone();
        self.emit(now, RunEvent::CheckpointUpdated { checkpoint });
        Ok(())
    }

    // --- transition helpers --------------------------------------------------

    fn transition(&mut self, to: Phase, now: u64) -> TickOutcome {
        let old_phase = self.phase();
        self.enter_phase(to, now);
        TickOutcome {
            old_phase,
            new_phase: to,
        }
    }

    fn require_creator(&self, caller: &NodeId) -> Result<()> {
        if caller != self.creator() {
            return Err(CoordinatorError::NotAuthorized {
                caller: *caller,
                required: "run creator",
            });
        }
        Ok(())
    }

    /// WaitingForMembers -> Warmup: admit pending members and open the
    /// warmup attestation window.
    fn begin_warmup(&mut self, now: u64) -> TickOutcome {
        let admitted = self.membership.admit(self.config().max_clients);
        info!(
            "run {}: warmup with {} active member(s) ({} newly admitted)",
            self.id(),
            self.membership.active_count(),
            admitted.len()
        );
        self.warmup_witnesses.clear();
        self.transition(Phase::Warmup, now)
    }

    /// Warmup -> RoundTrain if membership holds, else back to
    /// WaitingForMembers with the epoch aborted.
    fn finish_warmup(&mut self, now: u64, beacon: u64) -> TickOutcome {
        // Joins accepted during Warmup are admitted here, before the
        // first round snapshots the active count.
        self.membership.admit(self.config().max_clients);
        self.sweep_unhealthy(now, 0);

        if self.membership.active_count() < self.config().min_clients {
            warn!(
                "run {}: aborting epoch, {} active < min_clients {}",
                self.id(),
                self.membership.active_count(),
                self.config().min_clients
            );
            return self.transition(Phase::WaitingForMembers, now);
        }
        self.start_epoch(now, beacon);
        self.transition(Phase::RoundTrain, now)
    }

    fn start_epoch(&mut self, now: u64, beacon: u64) {
        self.progress.epoch += 1;
        self.progress.epoch_start_data_cursor = self.data_cursor;
        self.epoch_started_at = now;
        self.last_step = None;
        self.rounds.reset();
        self.start_round(0, now, beacon);
    }

    fn start_round(&mut self, height: u32, now: u64, beacon: u64) {
        let batch_size = target_batch_size(self.ramp_cursor(), &self.config().batch);
        let seed = derive_round_seed(beacon, self.id(), height);
        let round = Round::new(height, self.data_cursor, seed, self.membership.active_count());
        let data_cursor = round.data_cursor;
        self.rounds.begin(round);
        self.progress.step += 1;
        self.data_cursor += batch_size as u64;
        self.emit(
            now,
            RunEvent::RoundStarted {
                height,
                data_cursor,
                seed_hex: hex::encode(seed),
                batch_size,
            },
        );
    }

    /// End-of-epoch decision at the RoundWitness timeout.
    fn judge_round(&mut self, now: u64, beacon: u64) -> TickOutcome {
        // Lock the step ceiling once the epoch exceeds its time budget.
        if self.last_step.is_none()
            && now.saturating_sub(self.epoch_started_at) > self.config().timing.epoch_secs
        {
            let ceiling = self.progress.step + LAST_STEP_GRACE_ROUNDS;
            info!(
                "run {}: epoch over time budget, last step locked at {}",
                self.id(),
                ceiling
            );
            self.last_step = Some(ceiling);
        }

        let height = self.rounds.current_height();
        self.sweep_unhealthy(now, height);

        let witness_count = self
            .current_round()
            .map(|r| r.witnesses.len() as u16)
            .unwrap_or(0);

        let epoch_ends = if witness_count == 0 {
            // Nobody attested: end the epoch now rather than spin.
            warn!(
                "run {}: zero witnesses at height {}, forcing epoch end",
                self.id(),
                height
            );
            true
        } else {
            let committee = effective_committee_size(
                self.current_round()
                    .map(|r| r.participant_count_at_start)
                    .unwrap_or(0),
                self.config().witness_nodes,
            );
            let required_quorum = witness_quorum(committee);

            self.membership.active_count() < self.config().min_clients
                || witness_count < required_quorum
                || self.last_step.is_some_and(|ceiling| self.progress.step >= ceiling)
                || self.progress.step >= self.config().total_steps
                || self.pending_pause
        };

        if epoch_ends {
            let epoch = self.progress.epoch;
            self.emit(
                now,
                RunEvent::EpochCompleted {
                    epoch,
                    steps_in_epoch: height + 1,
                },
            );
            self.cold_start_epoch = false;
            self.transition(Phase::Cooldown, now)
        } else {
            self.start_round(height + 1, now, beacon);
            self.transition(Phase::RoundTrain, now)
        }
    }

    /// Cooldown -> Finished | Paused | WaitingForMembers.
    fn leave_cooldown(&mut self, now: u64) -> TickOutcome {
        if self.progress.step >= self.config().total_steps {
            let total_steps = self.progress.step;
            self.emit(now, RunEvent::RunFinished { total_steps });
            return self.transition(Phase::Finished, now);
        }
        if self.pending_pause {
            self.pending_pause = false;
            self.cold_start_epoch = true;
            self.emit(now, RunEvent::RunPaused);
            return self.transition(Phase::Paused, now);
        }
        self.transition(Phase::WaitingForMembers, now)
    }

    fn sweep_unhealthy(&mut self, now: u64, height: u32) {
        let removed = self.membership.sweep(height);
        for (identity, reason) in removed {
            info!(
                "run {}: {} exited at height {} ({})",
                self.id(),
                identity,
                height,
                reason
            );
            self.emit(
                now,
                RunEvent::ClientExited {
                    identity,
                    reason,
                    at_height: height,
                },
            );
        }
    }
}
