use serde::Serialize;

use super::mode::QuorumPolicy;
use super::rpc::{CatchUpRequest, CatchUpResponse, Learn, Outbound, PaxosMessage};
use super::slots::{LearnerSlot, SlotWindow};
use super::types::{EpochVector, ProposerRound, ReplicaId, SlotId, Value};

/// What a learner produced while handling one input
#[derive(Debug, Default)]
pub struct LearnerOutput {
    /// Newly decided values, in slot order with no gaps
    pub delivered: Vec<(SlotId, Value)>,
    pub outbound: Vec<Outbound>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearnerStatus {
    pub id: ReplicaId,
    pub leader: Option<ReplicaId>,
    pub adu: SlotId,
    pub catching_up: bool,
}

/// Learner state machine
pub struct LearnerState {
    pub id: ReplicaId,
    quorum: usize,
    leader: Option<ReplicaId>,
    next: SlotId,
    slots: SlotWindow<LearnerSlot>,
    catching_up: bool,
    highest_round: ProposerRound,
    retention: u64,
    epoch_vector: EpochVector,
    policy: Box<dyn QuorumPolicy>,
}

impl LearnerState {
    pub fn new(
        id: ReplicaId,
        quorum: usize,
        retention: u64,
        epoch_vector: EpochVector,
        policy: Box<dyn QuorumPolicy>,
    ) -> Self {
        Self {
            id,
            quorum,
            leader: None,
            next: 1,
            slots: SlotWindow::new(),
            catching_up: false,
            highest_round: ProposerRound::BOTTOM,
            retention,
            epoch_vector,
            policy,
        }
    }

    /// Every slot up to and including this one is decided
    pub fn adu(&self) -> SlotId {
        self.next - 1
    }

    /// Highest round carried by any vote seen so far
    pub fn highest_round(&self) -> ProposerRound {
        self.highest_round
    }

    pub fn is_catching_up(&self) -> bool {
        self.catching_up
    }

    pub fn slot(&self, slot: SlotId) -> Option<&LearnerSlot> {
        self.slots.get(slot)
    }

    pub fn status(&self) -> LearnerStatus {
        LearnerStatus {
            id: self.id,
            leader: self.leader,
            adu: self.adu(),
            catching_up: self.catching_up,
        }
    }

    pub fn trust(&mut self, leader: ReplicaId) {
        self.leader = Some(leader);
    }

    pub fn set_epoch_vector(&mut self, epoch_vector: EpochVector) {
        self.epoch_vector = epoch_vector;
    }

    pub fn handle_learn(&mut self, msg: Learn) -> LearnerOutput {
        let mut output = LearnerOutput::default();
        self.highest_round = self.highest_round.max(msg.round);
        if msg.slot < self.next {
            return output;
        }
        let slot = msg.slot;
        let Some(entry) = self.slots.get_mut(slot) else {
            return output;
        };
        if entry.is_learned() || msg.round < entry.rnd {
            return output;
        }
        if msg.round > entry.rnd {
            entry.rnd = msg.round;
            entry.votes.clear();
        }
        if entry.has_vote_from(msg.sender) {
            tracing::debug!(
                "Learner {} ignoring second vote from {} for slot {} in round {}",
                self.id,
                msg.sender,
                slot,
                msg.round
            );
            return output;
        }
        if let Some(first) = entry.votes.first() {
            if first.value != msg.value {
                tracing::warn!(
                    "Learner {} got conflicting values for slot {} in round {} from {}",
                    self.id,
                    slot,
                    msg.round,
                    msg.sender
                );
                return output;
            }
        }
        if !entry.epoch_conflict && self.policy.vote_conflicts(&self.epoch_vector, &msg) {
            tracing::debug!(
                "Learner {} sees epoch {} from {} for slot {}, checking quorums",
                self.id,
                msg.epoch_vector,
                msg.sender,
                slot
            );
            entry.epoch_conflict = true;
        }

        entry.votes.push(msg);
        if !self
            .policy
            .learn_quorum(&entry.votes, self.quorum, entry.epoch_conflict)
        {
            return output;
        }
        entry.learned = entry.votes.first().map(|vote| vote.value.clone());
        tracing::debug!("Learner {} learned slot {} in round {}", self.id, slot, entry.rnd);

        output.delivered = self.advance();
        if slot > self.next {
            output.outbound.extend(self.request_catch_up());
        }
        output
    }

    /// Deliver the gap-free prefix of learned slots.
    fn advance(&mut self) -> Vec<(SlotId, Value)> {
        let mut delivered = Vec::new();
        while let Some(value) = self.slots.get(self.next).and_then(|entry| entry.learned.clone()) {
            if let Some(entry) = self.slots.get_mut(self.next) {
                entry.decided = true;
            }
            delivered.push((self.next, value));
            self.next += 1;
        }

        if !delivered.is_empty() {
            let horizon = self.next.saturating_sub(self.retention);
            self.slots.compact(horizon);
            tracing::debug!("Learner {} advanced adu to {}", self.id, self.adu());
        }
        delivered
    }

    /// Maximal runs of unlearned slots between `next` and the highest learned slot.
    pub fn missing_ranges(&self) -> Vec<(SlotId, SlotId)> {
        let highest_learned = self
            .slots
            .range(self.next, self.slots.max_seen())
            .filter(|(_, entry)| entry.is_learned())
            .map(|(slot, _)| slot)
            .last();
        let Some(highest_learned) = highest_learned else {
            return Vec::new();
        };

        let mut ranges = Vec::new();
        let mut start: Option<SlotId> = None;
        for slot in self.next..highest_learned {
            let learned = self
                .slots
                .get(slot)
                .map(LearnerSlot::is_learned)
                .unwrap_or(false);
            match (learned, start) {
                (false, None) => start = Some(slot),
                (true, Some(from)) => {
                    ranges.push((from, slot - 1));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(from) = start {
            ranges.push((from, highest_learned - 1));
        }
        ranges
    }

    fn request_catch_up(&mut self) -> Option<Outbound> {
        if self.catching_up {
            return None;
        }
        let leader = self.leader.filter(|leader| *leader != self.id)?;
        let ranges = self.missing_ranges();
        if ranges.is_empty() {
            return None;
        }

        tracing::info!(
            "Learner {} missing {:?} behind adu {}, asking leader {}",
            self.id,
            ranges,
            self.adu(),
            leader
        );
        self.catching_up = true;
        Some(Outbound::Unicast(
            leader,
            PaxosMessage::CatchUpRequest(CatchUpRequest {
                sender: self.id,
                ranges,
            }),
        ))
    }

    /// Answer with every decided slot we still hold inside the ranges.
    pub fn handle_catch_up_request(&self, msg: &CatchUpRequest) -> Outbound {
        let decided: Vec<(SlotId, Value)> = msg
            .ranges
            .iter()
            .flat_map(|(from, to)| self.slots.range(*from, *to))
            .filter(|(_, entry)| entry.decided)
            .filter_map(|(slot, entry)| entry.learned.clone().map(|value| (slot, value)))
            .collect();

        tracing::debug!(
            "Learner {} answering catch-up from {} with {} slots",
            self.id,
            msg.sender,
            decided.len()
        );
        Outbound::Unicast(
            msg.sender,
            PaxosMessage::CatchUpResponse(CatchUpResponse {
                sender: self.id,
                decided,
            }),
        )
    }

    pub fn handle_catch_up_response(&mut self, msg: CatchUpResponse) -> LearnerOutput {
        self.catching_up = false;
        let mut filled = 0;
        for (slot, value) in msg.decided {
            if slot < self.next {
                continue;
            }
            if let Some(entry) = self.slots.get_mut(slot) {
                if !entry.is_learned() {
                    entry.learned = Some(value);
                    filled += 1;
                }
            }
        }
        tracing::debug!(
            "Learner {} filled {} slots from catch-up response by {}",
            self.id,
            filled,
            msg.sender
        );

        LearnerOutput {
            delivered: self.advance(),
            outbound: Vec::new(),
        }
    }

    /// Give up on an unanswered request and look for gaps again.
    pub fn catch_up_timeout(&mut self) -> Vec<Outbound> {
        self.catching_up = false;
        self.request_catch_up().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paxos::mode::ConsensusMode;

    fn learner(mode: ConsensusMode) -> LearnerState {
        LearnerState::new(1, 2, 16, EpochVector::new(3), mode.policy())
    }

    fn learn(sender: ReplicaId, slot: SlotId, counter: u64, value: &str) -> Learn {
        Learn {
            sender,
            slot,
            round: ProposerRound::new(counter, 0),
            value: Value::app_batch(value.as_bytes().to_vec()),
            epoch_vector: EpochVector::new(3),
        }
    }

    fn foo() -> Value {
        Value::app_batch(b"foo".to_vec())
    }

    #[test]
    fn test_quorum_of_votes_learns_and_delivers_once() {
        let mut l = learner(ConsensusMode::Plain);

        let out = l.handle_learn(learn(1, 1, 1, "foo"));
        assert!(out.delivered.is_empty());
        assert!(!l.slot(1).unwrap().is_learned());

        let out = l.handle_learn(learn(2, 1, 1, "foo"));
        assert_eq!(out.delivered, vec![(1, foo())]);
        assert_eq!(l.adu(), 1);

        let out = l.handle_learn(learn(0, 1, 1, "foo"));
        assert!(out.delivered.is_empty());
    }

    #[test]
    fn test_duplicate_vote_not_counted() {
        let mut l = learner(ConsensusMode::Plain);
        l.handle_learn(learn(1, 1, 1, "foo"));
        let out = l.handle_learn(learn(1, 1, 1, "foo"));
        assert!(out.delivered.is_empty());
        assert_eq!(l.slot(1).unwrap().votes.len(), 1);
    }

    #[test]
    fn test_higher_round_resets_votes() {
        let mut l = learner(ConsensusMode::Plain);
        l.handle_learn(learn(1, 1, 1, "old"));
        l.handle_learn(learn(2, 1, 2, "foo"));
        assert_eq!(l.slot(1).unwrap().votes.len(), 1);

        // Lower round is ignored outright
        let out = l.handle_learn(learn(0, 1, 1, "old"));
        assert!(out.delivered.is_empty());

        let out = l.handle_learn(learn(1, 1, 2, "foo"));
        assert_eq!(out.delivered, vec![(1, foo())]);
    }

    #[test]
    fn test_gap_triggers_catch_up_request() {
        let mut l = learner(ConsensusMode::Plain);
        l.trust(0);

        l.handle_learn(learn(1, 4, 1, "four"));
        let out = l.handle_learn(learn(2, 4, 1, "four"));

        assert!(out.delivered.is_empty());
        assert_eq!(l.adu(), 0);
        assert!(l.is_catching_up());
        assert_eq!(
            out.outbound,
            vec![Outbound::Unicast(
                0,
                PaxosMessage::CatchUpRequest(CatchUpRequest {
                    sender: 1,
                    ranges: vec![(1, 3)],
                })
            )]
        );

        // Only one request in flight
        l.handle_learn(learn(1, 6, 1, "six"));
        let out = l.handle_learn(learn(2, 6, 1, "six"));
        assert!(out.outbound.is_empty());
        assert_eq!(l.missing_ranges(), vec![(1, 3), (5, 5)]);
    }

    #[test]
    fn test_leader_does_not_request_catch_up() {
        let mut l = learner(ConsensusMode::Plain);
        l.trust(1);
        l.handle_learn(learn(0, 3, 1, "three"));
        let out = l.handle_learn(learn(2, 3, 1, "three"));
        assert!(out.outbound.is_empty());
        assert!(!l.is_catching_up());
    }

    #[test]
    fn test_out_of_order_learns_deliver_in_order() {
        let mut l = learner(ConsensusMode::Plain);
        for slot in [3, 2] {
            l.handle_learn(learn(0, slot, 1, "x"));
            let out = l.handle_learn(learn(2, slot, 1, "x"));
            assert!(out.delivered.is_empty());
        }
        l.handle_learn(learn(0, 1, 1, "first"));
        let out = l.handle_learn(learn(2, 1, 1, "first"));
        let slots: Vec<SlotId> = out.delivered.iter().map(|(slot, _)| *slot).collect();
        assert_eq!(slots, vec![1, 2, 3]);
        assert_eq!(l.adu(), 3);
    }

    #[test]
    fn test_catch_up_round_trip() {
        let mut leader = learner(ConsensusMode::Plain);
        for slot in 1..=3 {
            leader.handle_learn(learn(0, slot, 1, "v"));
            leader.handle_learn(learn(2, slot, 1, "v"));
        }
        assert_eq!(leader.adu(), 3);

        let request = CatchUpRequest {
            sender: 2,
            ranges: vec![(1, 2), (3, 5)],
        };
        let response = match leader.handle_catch_up_request(&request) {
            Outbound::Unicast(2, PaxosMessage::CatchUpResponse(response)) => response,
            other => panic!("unexpected {:?}", other),
        };
        // Slots 4 and 5 are not decided at the leader and are left out
        let slots: Vec<SlotId> = response.decided.iter().map(|(slot, _)| *slot).collect();
        assert_eq!(slots, vec![1, 2, 3]);

        let mut lagging = learner(ConsensusMode::Plain);
        lagging.trust(0);
        lagging.handle_learn(learn(0, 4, 1, "four"));
        lagging.handle_learn(learn(2, 4, 1, "four"));
        assert!(lagging.is_catching_up());

        let out = lagging.handle_catch_up_response(response);
        let slots: Vec<SlotId> = out.delivered.iter().map(|(slot, _)| *slot).collect();
        assert_eq!(slots, vec![1, 2, 3, 4]);
        assert!(!lagging.is_catching_up());
    }

    #[test]
    fn test_incomplete_response_retried_on_timeout() {
        let mut l = learner(ConsensusMode::Plain);
        l.trust(0);
        l.handle_learn(learn(0, 3, 1, "three"));
        l.handle_learn(learn(2, 3, 1, "three"));

        let out = l.handle_catch_up_response(CatchUpResponse {
            sender: 0,
            decided: vec![(1, Value::noop())],
        });
        assert_eq!(out.delivered, vec![(1, Value::noop())]);

        let retry = l.catch_up_timeout();
        assert_eq!(
            retry,
            vec![Outbound::Unicast(
                0,
                PaxosMessage::CatchUpRequest(CatchUpRequest {
                    sender: 1,
                    ranges: vec![(2, 2)],
                })
            )]
        );
    }

    #[test]
    fn test_decided_slots_evicted_beyond_retention() {
        let mut l = LearnerState::new(1, 1, 2, EpochVector::new(3), ConsensusMode::Plain.policy());
        for slot in 1..=5 {
            l.handle_learn(learn(0, slot, 1, "v"));
        }
        assert_eq!(l.adu(), 5);
        assert!(l.slot(3).is_none());
        assert!(l.slot(4).unwrap().decided);
    }

    #[test]
    fn test_epoch_conflict_requires_valid_quorum() {
        let mut l = learner(ConsensusMode::EpochAware);

        let mut stale = learn(0, 1, 1, "foo");
        stale.sender = 1;
        let mut aware = learn(2, 1, 1, "foo");
        aware.epoch_vector = EpochVector::from_entries(vec![0, 1, 0]);

        l.handle_learn(stale);
        let out = l.handle_learn(aware);
        assert!(out.delivered.is_empty());
        assert!(l.slot(1).unwrap().epoch_conflict);

        // Replicas 0 and 1 share the same view, which is a valid quorum
        let out = l.handle_learn(learn(0, 1, 1, "foo"));
        assert_eq!(out.delivered, vec![(1, foo())]);
    }

    #[test]
    fn test_highest_round_tracks_every_vote() {
        let mut l = learner(ConsensusMode::Plain);
        l.handle_learn(learn(0, 1, 2, "foo"));
        l.handle_learn(learn(2, 1, 2, "foo"));
        assert_eq!(l.adu(), 1);

        // Stale slot, but its round still counts
        l.handle_learn(learn(0, 1, 9, "bar"));
        assert_eq!(l.highest_round(), ProposerRound::new(9, 0));
        assert_eq!(l.adu(), 1);
    }
}
