use serde::{Deserialize, Serialize};

use super::mode::QuorumPolicy;
use super::rpc::{AcceptedSlot, Accept, Learn, Prepare, Promise};
use super::slots::{AcceptorSlot, SlotWindow};
use super::types::{EpochVector, ProposerRound, ReplicaId, SlotId, Value};

/// Copy of an acceptor's votes, handed to a replacement replica
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptorSnapshot {
    pub rnd: ProposerRound,
    pub slots: Vec<(SlotId, ProposerRound, Value)>,
}

/// Promise/vote state of one acceptor
pub struct AcceptorState {
    pub id: ReplicaId,
    rnd: ProposerRound,
    slots: SlotWindow<AcceptorSlot>,
    epoch_vector: EpochVector,
    retention: u64,
    policy: Box<dyn QuorumPolicy>,
}

impl AcceptorState {
    pub fn new(
        id: ReplicaId,
        epoch_vector: EpochVector,
        retention: u64,
        policy: Box<dyn QuorumPolicy>,
    ) -> Self {
        Self {
            id,
            rnd: ProposerRound::BOTTOM,
            slots: SlotWindow::new(),
            epoch_vector,
            retention,
            policy,
        }
    }

    pub fn rnd(&self) -> ProposerRound {
        self.rnd
    }

    pub fn low_slot(&self) -> SlotId {
        self.slots.low()
    }

    pub fn max_seen(&self) -> SlotId {
        self.slots.max_seen()
    }

    pub fn slot(&self, slot: SlotId) -> Option<&AcceptorSlot> {
        self.slots.get(slot)
    }

    pub fn set_epoch_vector(&mut self, epoch_vector: EpochVector) {
        self.epoch_vector = epoch_vector;
    }

    /// Phase 1b. Returns the promise and the replica it is destined to.
    pub fn handle_prepare(&mut self, msg: &Prepare) -> Option<(Promise, ReplicaId)> {
        if msg.candidate_round <= self.rnd {
            tracing::debug!(
                "Acceptor {} ignoring prepare {} from {} - current round {}",
                self.id,
                msg.candidate_round,
                msg.sender,
                self.rnd
            );
            return None;
        }
        self.rnd = msg.candidate_round;

        // Everything below the proposer's frontier is decided
        self.compact_behind(msg.slot);

        let accumulated_slots = self
            .slots
            .range(msg.slot, self.slots.max_seen())
            .filter(|(_, entry)| !entry.vrnd.is_bottom())
            .filter_map(|(slot, entry)| {
                entry.vval.clone().map(|vval| AcceptedSlot {
                    slot,
                    vrnd: entry.vrnd,
                    vval,
                })
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "Acceptor {} promised round {} to {} with {} voted slots",
            self.id,
            self.rnd,
            msg.sender,
            accumulated_slots.len()
        );

        let promise = Promise {
            sender: self.id,
            round: self.rnd,
            accumulated_slots,
            epoch_vector: self.epoch_vector.clone(),
        };
        Some((promise, msg.sender))
    }

    /// Phase 2b. Returns the vote to broadcast to learners.
    pub fn handle_accept(&mut self, msg: &Accept) -> Option<Learn> {
        if !self
            .policy
            .admits_accept(self.id, &self.epoch_vector, msg)
        {
            tracing::debug!(
                "Acceptor {} ignoring accept for slot {} - epoch {} does not match {}",
                self.id,
                msg.slot,
                msg.epoch_vector,
                self.epoch_vector
            );
            return None;
        }
        if self.rnd > msg.round {
            tracing::debug!(
                "Acceptor {} ignoring accept {} for slot {} - current round {}",
                self.id,
                msg.round,
                msg.slot,
                self.rnd
            );
            return None;
        }

        // Accepts run at most alpha ahead of the proposer's adu
        self.compact_behind(msg.slot);

        let entry = self.slots.get_mut(msg.slot)?;
        if entry.vrnd == msg.round {
            return None;
        }
        entry.vrnd = msg.round;
        entry.vval = Some(msg.value.clone());

        if self.rnd < msg.round {
            self.rnd = msg.round;
        }

        Some(Learn {
            sender: self.id,
            slot: msg.slot,
            round: msg.round,
            value: msg.value.clone(),
            epoch_vector: self.epoch_vector.clone(),
        })
    }

    /// Drop slots more than `retention` behind `frontier`.
    fn compact_behind(&mut self, frontier: SlotId) {
        let horizon = frontier.saturating_sub(self.retention);
        if horizon > self.slots.low() {
            self.slots.compact(horizon);
        }
    }

    /// Copy of every vote for slots after `after_slot`.
    pub fn snapshot_after(&self, after_slot: SlotId) -> AcceptorSnapshot {
        let slots = self
            .slots
            .range(after_slot + 1, self.slots.max_seen())
            .filter_map(|(slot, entry)| {
                entry
                    .vval
                    .clone()
                    .map(|vval| (slot, entry.vrnd, vval))
            })
            .collect();
        AcceptorSnapshot {
            rnd: self.rnd,
            slots,
        }
    }

    /// Install votes obtained from another acceptor. Never lowers a vote.
    pub fn install(&mut self, snapshot: AcceptorSnapshot) {
        if snapshot.rnd > self.rnd {
            self.rnd = snapshot.rnd;
        }
        let mut installed = 0;
        for (slot, vrnd, vval) in snapshot.slots {
            if let Some(entry) = self.slots.get_mut(slot) {
                if vrnd > entry.vrnd {
                    entry.vrnd = vrnd;
                    entry.vval = Some(vval);
                    installed += 1;
                }
            }
        }
        tracing::info!(
            "Acceptor {} installed {} slots, round {}",
            self.id,
            installed,
            self.rnd
        );
    }

    /// Raise the low-water mark; accepts below it are ignored from now on.
    pub fn set_low_slot(&mut self, slot: SlotId) {
        self.slots.compact(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paxos::mode::ConsensusMode;

    fn acceptor(mode: ConsensusMode) -> AcceptorState {
        AcceptorState::new(1, EpochVector::new(3), 1024, mode.policy())
    }

    fn prepare(counter: u64, owner: ReplicaId, slot: SlotId) -> Prepare {
        Prepare {
            sender: owner,
            candidate_round: ProposerRound::new(counter, owner),
            slot,
        }
    }

    fn accept(round: ProposerRound, slot: SlotId, value: &[u8]) -> Accept {
        Accept {
            sender: round.owner,
            round,
            slot,
            value: Value::app_batch(value.to_vec()),
            epoch_vector: EpochVector::new(3),
        }
    }

    #[test]
    fn test_prepare_requires_strictly_higher_round() {
        let mut acc = acceptor(ConsensusMode::Plain);

        let (promise, to) = acc.handle_prepare(&prepare(1, 0, 0)).unwrap();
        assert_eq!(to, 0);
        assert_eq!(promise.round, ProposerRound::new(1, 0));
        assert!(promise.accumulated_slots.is_empty());

        assert!(acc.handle_prepare(&prepare(1, 0, 0)).is_none());
        assert!(acc.handle_prepare(&prepare(0, 2, 0)).is_none());
        assert!(acc.handle_prepare(&prepare(1, 2, 0)).is_some());
        assert_eq!(acc.rnd(), ProposerRound::new(1, 2));
    }

    #[test]
    fn test_promise_reports_votes_from_frontier() {
        let mut acc = acceptor(ConsensusMode::Plain);
        let round = ProposerRound::new(1, 0);
        for slot in 1..=4 {
            acc.handle_accept(&accept(round, slot, b"v")).unwrap();
        }

        let (promise, _) = acc.handle_prepare(&prepare(2, 2, 3)).unwrap();
        let slots: Vec<SlotId> = promise.accumulated_slots.iter().map(|s| s.slot).collect();
        assert_eq!(slots, vec![3, 4]);
        assert!(promise.accumulated_slots.iter().all(|s| s.vrnd == round));
    }

    #[test]
    fn test_accept_records_vote_and_raises_round() {
        let mut acc = acceptor(ConsensusMode::Plain);
        let round = ProposerRound::new(3, 2);

        let learn = acc.handle_accept(&accept(round, 5, b"foo")).unwrap();
        assert_eq!(learn.sender, 1);
        assert_eq!(learn.slot, 5);
        assert_eq!(learn.round, round);
        assert_eq!(acc.rnd(), round);
        assert_eq!(acc.max_seen(), 5);

        // Duplicate of the same vote
        assert!(acc.handle_accept(&accept(round, 5, b"foo")).is_none());
        // Lower round
        assert!(acc
            .handle_accept(&accept(ProposerRound::new(2, 2), 6, b"bar"))
            .is_none());
        assert!(acc.slot(6).is_none());
    }

    #[test]
    fn test_round_never_decreases() {
        let mut acc = acceptor(ConsensusMode::Plain);
        let mut last = acc.rnd();
        let steps = [(4, 0), (2, 1), (4, 2), (3, 0), (9, 1)];
        for (i, (counter, owner)) in steps.iter().enumerate() {
            let round = ProposerRound::new(*counter, *owner);
            if i % 2 == 0 {
                acc.handle_prepare(&prepare(*counter, *owner, 0));
            } else {
                acc.handle_accept(&accept(round, i as SlotId + 1, b"x"));
            }
            assert!(acc.rnd() >= last);
            last = acc.rnd();
        }
        assert_eq!(last, ProposerRound::new(9, 1));
    }

    #[test]
    fn test_low_slot_rejects_old_accepts() {
        let mut acc = acceptor(ConsensusMode::Plain);
        acc.set_low_slot(10);
        assert_eq!(acc.low_slot(), 10);
        assert!(acc
            .handle_accept(&accept(ProposerRound::new(1, 0), 9, b"old"))
            .is_none());
        assert!(acc
            .handle_accept(&accept(ProposerRound::new(1, 0), 10, b"new"))
            .is_some());
    }

    #[test]
    fn test_snapshot_and_install() {
        let mut source = acceptor(ConsensusMode::Plain);
        let round = ProposerRound::new(2, 0);
        for slot in 1..=3 {
            source.handle_accept(&accept(round, slot, b"s")).unwrap();
        }

        let snapshot = source.snapshot_after(1);
        assert_eq!(snapshot.rnd, round);
        assert_eq!(snapshot.slots.len(), 2);
        assert_eq!(snapshot.slots[0].0, 2);

        let mut target = acceptor(ConsensusMode::Plain);
        target.install(snapshot);
        assert_eq!(target.rnd(), round);
        assert_eq!(target.slot(3).unwrap().vrnd, round);
        assert!(target.slot(1).unwrap().vval.is_none());
    }

    #[test]
    fn test_epoch_aware_ignores_mismatched_membership() {
        let mut acc = AcceptorState::new(
            1,
            EpochVector::from_entries(vec![0, 1, 0]),
            1024,
            ConsensusMode::EpochAware.policy(),
        );
        let round = ProposerRound::new(1, 0);
        assert!(acc.handle_accept(&accept(round, 1, b"x")).is_none());

        let mut current = accept(round, 1, b"x");
        current.epoch_vector = EpochVector::from_entries(vec![0, 1, 0]);
        let learn = acc.handle_accept(&current).unwrap();
        assert_eq!(learn.epoch_vector.entries(), &[0, 1, 0]);
    }

    #[test]
    fn test_steady_accepts_keep_window_bounded() {
        let mut acc = AcceptorState::new(1, EpochVector::new(3), 16, ConsensusMode::Plain.policy());
        acc.handle_prepare(&prepare(1, 0, 0)).unwrap();
        let round = ProposerRound::new(1, 0);
        for slot in 1..=10_000 {
            acc.handle_accept(&accept(round, slot, b"v")).unwrap();
        }

        assert_eq!(acc.max_seen(), 10_000);
        assert_eq!(acc.low_slot(), 10_000 - 16);
        assert_eq!(acc.max_seen() - acc.low_slot() + 1, 17);
        assert!(acc.slot(1).is_none());
        assert!(acc.slot(10_000).is_some());
    }
}
