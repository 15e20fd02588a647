// Membership ledger - pending, active, and exited participants.
//
// SAFETY INVARIANTS:
// 1. Slot index 0 is reserved: slot_of() == 0 always means "not an
//    active member", distinguishing never-joined from exited
// 2. Active slots are dense 1..=N at all times; the sweep compacts
//    with swap-with-last and reindexes in the same operation
// 3. The exited list is archival and never pruned

use crate::error::{CoordinatorError, Result};
use plexus_core::{ExitReason, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health flag for an active participant. Non-Healthy flags are acted
/// on by the next unhealthy sweep, not immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantState {
    Healthy,
    /// Flagged by a quorum-validated health report
    Dropped,
    /// Requested its own exit
    Withdrawn,
}

/// One compute node attached to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: NodeId,
    /// Opaque endpoint reference; transport is out of scope here
    pub endpoint: String,
    pub state: ParticipantState,
    /// Round height at which the participant left; 0 while active
    pub exited_at_height: u32,
    /// Unix seconds of the join request
    pub joined_at: u64,
}

impl Participant {
    fn new(id: NodeId, endpoint: String, joined_at: u64) -> Self {
        Participant {
            id,
            endpoint,
            state: ParticipantState::Healthy,
            exited_at_height: 0,
            joined_at,
        }
    }
}

/// Per-run membership bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MembershipLedger {
    pending: Vec<Participant>,
    active: Vec<Participant>,
    exited: Vec<Participant>,
    /// Identity -> 1-based active slot index
    slots: HashMap<NodeId, u16>,
}

impl MembershipLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a join request. Rejects identities already pending or
    /// active; identities that exited earlier may join again.
    pub fn request_join(&mut self, id: NodeId, endpoint: String, now: u64) -> Result<()> {
        if self.slots.contains_key(&id) || self.pending.iter().any(|p| p.id == id) {
            return Err(CoordinatorError::DuplicateJoin(id));
        }
        self.pending.push(Participant::new(id, endpoint, now));
        Ok(())
    }

    /// Admit pending members into the active set, in arrival order, up
    /// to `capacity` total active members. Excess stays pending for the
    /// next admission window; admission is best-effort, never an error.
    pub fn admit(&mut self, capacity: u16) -> Vec<NodeId> {
        let mut admitted = Vec::new();
        while !self.pending.is_empty() && (self.active.len() as u16) < capacity {
            let participant = self.pending.remove(0);
            let slot = self.active.len() as u16 + 1;
            self.slots.insert(participant.id, slot);
            admitted.push(participant.id);
            self.active.push(participant);
        }
        admitted
    }

    /// Flag the caller's own exit; honored at the next sweep.
    pub fn withdraw(&mut self, id: &NodeId) -> Result<()> {
        let slot = self.slot_of(id);
        if slot == 0 {
            return Err(CoordinatorError::MemberNotFound(*id));
        }
        self.active[slot as usize - 1].state = ParticipantState::Withdrawn;
        Ok(())
    }

    /// Flag a participant as dropped. The caller has already validated
    /// the flag against the witness health test.
    pub fn flag_dropped(&mut self, slot: u16) -> Result<()> {
        let participant = self
            .active
            .get_mut(slot.wrapping_sub(1) as usize)
            .ok_or(CoordinatorError::SlotOutOfRange { slot })?;
        if participant.state == ParticipantState::Healthy {
            participant.state = ParticipantState::Dropped;
        }
        Ok(())
    }

    /// Move every non-Healthy active participant into the exited list,
    /// recording `height`, and compact the slot space.
    pub fn sweep(&mut self, height: u32) -> Vec<(NodeId, ExitReason)> {
        let mut removed = Vec::new();
        let mut i = 0;
        while i < self.active.len() {
            match self.active[i].state {
                ParticipantState::Healthy => i += 1,
                state => {
                    let mut participant = self.active.swap_remove(i);
                    participant.exited_at_height = height;
                    let reason = match state {
                        ParticipantState::Withdrawn => ExitReason::Withdrawn,
                        _ => ExitReason::Dropped,
                    };
                    removed.push((participant.id, reason));
                    self.exited.push(participant);
                }
            }
        }
        if !removed.is_empty() {
            self.reindex();
        }
        removed
    }

    fn reindex(&mut self) {
        self.slots.clear();
        for (i, participant) in self.active.iter().enumerate() {
            self.slots.insert(participant.id, i as u16 + 1);
        }
    }

    /// 1-based slot of an active member; 0 if not active.
    pub fn slot_of(&self, id: &NodeId) -> u16 {
        self.slots.get(id).copied().unwrap_or(0)
    }

    pub fn participant_by_slot(&self, slot: u16) -> Option<&Participant> {
        if slot == 0 {
            return None;
        }
        self.active.get(slot as usize - 1)
    }

    pub fn is_active(&self, id: &NodeId) -> bool {
        self.slot_of(id) != 0
    }

    pub fn active_count(&self) -> u16 {
        self.active.len() as u16
    }

    pub fn pending_count(&self) -> u16 {
        self.pending.len() as u16
    }

    pub fn active(&self) -> &[Participant] {
        &self.active
    }

    pub fn exited(&self) -> &[Participant] {
        &self.exited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(i: u32) -> NodeId {
        NodeId::derive(format!("node-{}", i).as_bytes())
    }

    fn ledger_with_active(n: u32) -> MembershipLedger {
        let mut ledger = MembershipLedger::new();
        for i in 0..n {
            ledger
                .request_join(node(i), format!("endpoint-{}", i), 100)
                .unwrap();
        }
        ledger.admit(u16::MAX);
        ledger
    }

    #[test]
    fn test_join_then_admit_assigns_dense_slots() {
        let ledger = ledger_with_active(5);
        assert_eq!(ledger.active_count(), 5);
        for i in 0..5 {
            assert_eq!(ledger.slot_of(&node(i)), i as u16 + 1);
        }
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let mut ledger = MembershipLedger::new();
        ledger.request_join(node(1), "e".into(), 0).unwrap();
        assert_eq!(
            ledger.request_join(node(1), "e".into(), 0),
            Err(CoordinatorError::DuplicateJoin(node(1)))
        );
        ledger.admit(u16::MAX);
        assert_eq!(
            ledger.request_join(node(1), "e".into(), 0),
            Err(CoordinatorError::DuplicateJoin(node(1)))
        );
    }

    #[test]
    fn test_admit_truncates_at_capacity() {
        let mut ledger = MembershipLedger::new();
        for i in 0..10 {
            ledger.request_join(node(i), "e".into(), 0).unwrap();
        }
        let admitted = ledger.admit(4);
        assert_eq!(admitted.len(), 4);
        assert_eq!(ledger.active_count(), 4);
        assert_eq!(ledger.pending_count(), 6);
        // Next window admits the rest, in arrival order.
        let more = ledger.admit(8);
        assert_eq!(more.first(), Some(&node(4)));
        assert_eq!(ledger.active_count(), 8);
    }

    #[test]
    fn test_slot_zero_is_never_assigned() {
        let ledger = ledger_with_active(3);
        assert!(ledger.participant_by_slot(0).is_none());
        assert_eq!(ledger.slot_of(&node(99)), 0);
    }

    #[test]
    fn test_sweep_compacts_and_reindexes() {
        let mut ledger = ledger_with_active(5);
        ledger.withdraw(&node(1)).unwrap();
        ledger.flag_dropped(4).unwrap(); // node(3)

        let removed = ledger.sweep(7);
        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&(node(1), ExitReason::Withdrawn)));
        assert!(removed.contains(&(node(3), ExitReason::Dropped)));

        // Slots stay dense 1..=3 and point at the right participants.
        assert_eq!(ledger.active_count(), 3);
        let mut seen = Vec::new();
        for slot in 1..=3 {
            let p = ledger.participant_by_slot(slot).unwrap();
            assert_eq!(ledger.slot_of(&p.id), slot);
            seen.push(p.id);
        }
        assert!(seen.contains(&node(0)));
        assert!(seen.contains(&node(2)));
        assert!(seen.contains(&node(4)));

        // Exited entries carry the sweep height.
        assert!(ledger.exited().iter().all(|p| p.exited_at_height == 7));
        assert_eq!(ledger.slot_of(&node(1)), 0);
    }

    #[test]
    fn test_exited_member_can_rejoin() {
        let mut ledger = ledger_with_active(2);
        ledger.withdraw(&node(0)).unwrap();
        ledger.sweep(1);
        assert!(ledger.request_join(node(0), "e2".into(), 50).is_ok());
    }

    #[test]
    fn test_withdraw_requires_active_membership() {
        let mut ledger = MembershipLedger::new();
        ledger.request_join(node(0), "e".into(), 0).unwrap();
        // Pending members are not active yet.
        assert_eq!(
            ledger.withdraw(&node(0)),
            Err(CoordinatorError::MemberNotFound(node(0)))
        );
    }

    #[test]
    fn test_flag_dropped_out_of_range() {
        let mut ledger = ledger_with_active(2);
        assert_eq!(
            ledger.flag_dropped(3),
            Err(CoordinatorError::SlotOutOfRange { slot: 3 })
        );
        assert_eq!(
            ledger.flag_dropped(0),
            Err(CoordinatorError::SlotOutOfRange { slot: 0 })
        );
    }
}
