use serde::Serialize;
use std::collections::VecDeque;

use super::mode::QuorumPolicy;
use super::rpc::{Accept, Outbound, PaxosMessage, Prepare, Promise};
use super::slots::{ProposerSlot, SlotWindow};
use super::types::{EpochVector, ProposerRound, ReplicaId, SlotId, Value};
use crate::util::errors::{PaxosError, Result};

/// Where the proposer is within its current round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Not the leader, sends nothing
    Idle,
    /// Waiting for a quorum of promises
    One,
    /// Pipelining accepts
    Two,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::One => write!(f, "Phase1"),
            Phase::Two => write!(f, "Phase2"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposerStatus {
    pub id: ReplicaId,
    pub leader: Option<ReplicaId>,
    pub phase: Phase,
    pub round: ProposerRound,
    pub adu: SlotId,
    pub next_slot: SlotId,
    pub queued: usize,
}

/// Proposer state machine
pub struct ProposerState {
    pub id: ReplicaId,
    quorum: usize,
    alpha: u64,
    resend_threshold: u32,
    crnd: ProposerRound,
    highest_seen: u64,
    leader: Option<ReplicaId>,
    phase: Phase,
    promises: Vec<Promise>,
    adu: SlotId,
    next_slot: SlotId,
    progress_mark: SlotId,
    slots: SlotWindow<ProposerSlot>,
    queue: VecDeque<Value>,
    epoch_vector: EpochVector,
    policy: Box<dyn QuorumPolicy>,
}

impl ProposerState {
    pub fn new(
        id: ReplicaId,
        quorum: usize,
        alpha: u64,
        resend_threshold: u32,
        epoch_vector: EpochVector,
        policy: Box<dyn QuorumPolicy>,
    ) -> Self {
        Self {
            id,
            quorum,
            alpha,
            resend_threshold,
            crnd: ProposerRound::BOTTOM,
            highest_seen: 0,
            leader: None,
            phase: Phase::Idle,
            promises: Vec::new(),
            adu: 0,
            next_slot: 1,
            progress_mark: 0,
            slots: SlotWindow::new(),
            queue: VecDeque::new(),
            epoch_vector,
            policy,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.leader == Some(self.id)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round(&self) -> ProposerRound {
        self.crnd
    }

    pub fn adu(&self) -> SlotId {
        self.adu
    }

    pub fn status(&self) -> ProposerStatus {
        ProposerStatus {
            id: self.id,
            leader: self.leader,
            phase: self.phase,
            round: self.crnd,
            adu: self.adu,
            next_slot: self.next_slot,
            queued: self.queue.len(),
        }
    }

    pub fn set_epoch_vector(&mut self, epoch_vector: EpochVector) {
        self.epoch_vector = epoch_vector;
    }

    /// Leader-detector notification
    pub fn trust(&mut self, leader: ReplicaId) -> Vec<Outbound> {
        let was_leader = self.is_leader();
        self.leader = Some(leader);

        if leader != self.id {
            if was_leader {
                tracing::info!(
                    "Proposer {} abdicating in round {}, now trusting {}",
                    self.id,
                    self.crnd,
                    leader
                );
            }
            self.phase = Phase::Idle;
            self.promises.clear();
            return Vec::new();
        }

        if was_leader && self.phase != Phase::Idle {
            return Vec::new();
        }
        self.start_phase_one()
    }

    fn start_phase_one(&mut self) -> Vec<Outbound> {
        self.crnd = self.crnd.next_after(self.highest_seen, self.id);
        self.phase = Phase::One;
        self.promises.clear();
        for slot in self.adu + 1..self.next_slot.max(self.slots.max_seen() + 1) {
            if let Some(entry) = self.slots.get_mut(slot) {
                entry.seeded_from = ProposerRound::BOTTOM;
                entry.resends = 0;
            }
        }

        tracing::info!(
            "Proposer {} starting phase 1 with round {} (adu: {})",
            self.id,
            self.crnd,
            self.adu
        );

        vec![Outbound::Broadcast(PaxosMessage::Prepare(Prepare {
            sender: self.id,
            candidate_round: self.crnd,
            slot: self.adu,
        }))]
    }

    pub fn handle_promise(&mut self, promise: Promise) -> Vec<Outbound> {
        self.highest_seen = self.highest_seen.max(promise.round.counter);
        for accepted in &promise.accumulated_slots {
            self.highest_seen = self.highest_seen.max(accepted.vrnd.counter);
        }

        if !self.is_leader() || self.phase != Phase::One || promise.round != self.crnd {
            tracing::debug!(
                "Proposer {} ignoring promise {} from {} (phase: {}, round: {})",
                self.id,
                promise.round,
                promise.sender,
                self.phase,
                self.crnd
            );
            return Vec::new();
        }

        match self
            .promises
            .iter()
            .position(|existing| existing.sender == promise.sender)
        {
            Some(pos) => self.promises[pos] = promise,
            None => self.promises.push(promise),
        }

        if self
            .policy
            .promise_quorum(&self.promises, self.quorum)
            .is_none()
        {
            return Vec::new();
        }
        self.complete_phase_one()
    }

    fn complete_phase_one(&mut self) -> Vec<Outbound> {
        let mut highest_reported = self.adu;

        // Own values are settled only after every report has been applied
        let own_before: Vec<(SlotId, Value)> = self
            .slots
            .range(self.adu + 1, self.slots.max_seen())
            .filter(|(_, entry)| entry.own)
            .filter_map(|(slot, entry)| entry.value.clone().map(|value| (slot, value)))
            .collect();

        for promise in &self.promises {
            for accepted in &promise.accumulated_slots {
                if accepted.slot <= self.adu {
                    continue;
                }
                highest_reported = highest_reported.max(accepted.slot);
                let Some(entry) = self.slots.get_mut(accepted.slot) else {
                    continue;
                };
                if !entry.seeded_from.is_bottom() && accepted.vrnd <= entry.seeded_from {
                    continue;
                }
                entry.value = Some(accepted.vval.clone());
                entry.seeded_from = accepted.vrnd;
                entry.own = false;
            }
        }

        let mut displaced = Vec::new();
        for (slot, value) in own_before {
            if let Some(entry) = self.slots.get_mut(slot) {
                if entry.value.as_ref() == Some(&value) {
                    entry.own = true;
                } else {
                    displaced.push(value);
                }
            }
        }

        let mut holes = 0;
        for slot in self.adu + 1..=highest_reported {
            if let Some(entry) = self.slots.get_mut(slot) {
                if entry.value.is_none() {
                    entry.value = Some(Value::noop());
                    entry.own = false;
                    holes += 1;
                }
            }
        }

        for value in displaced.into_iter().rev() {
            self.queue.push_front(value);
        }

        tracing::info!(
            "Proposer {} completed phase 1 for round {} with {} promises, filled {} holes up to slot {}",
            self.id,
            self.crnd,
            self.promises.len(),
            holes,
            highest_reported
        );

        self.phase = Phase::Two;
        self.next_slot = self.adu + 1;
        self.progress_mark = self.adu;
        self.fill_pipeline()
    }

    /// Send accepts for every free slot inside the `alpha` window.
    fn fill_pipeline(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        if !self.is_leader() || self.phase != Phase::Two {
            return out;
        }

        while self.next_slot <= self.adu + self.alpha {
            let slot = self.next_slot;
            let Some(entry) = self.slots.get_mut(slot) else {
                break;
            };
            let value = match &entry.value {
                Some(value) => value.clone(),
                None => match self.queue.pop_front() {
                    Some(value) => {
                        entry.value = Some(value.clone());
                        entry.own = true;
                        value
                    }
                    None => break,
                },
            };
            entry.resends = 0;

            out.push(Outbound::Broadcast(PaxosMessage::Accept(Accept {
                sender: self.id,
                round: self.crnd,
                slot,
                value,
                epoch_vector: self.epoch_vector.clone(),
            })));
            self.next_slot += 1;
        }
        out
    }

    /// Queue a client value. Only the leader takes values.
    pub fn submit(&mut self, value: Value) -> Result<Vec<Outbound>> {
        if !self.is_leader() {
            return Err(PaxosError::NotLeader(self.leader));
        }
        self.queue.push_back(value);
        Ok(self.fill_pipeline())
    }

    /// The local learner decided every slot up to `adu`.
    ///
    /// `decided` holds the values it delivered; an own client value whose
    /// slot was decided with something else goes back to the queue.
    pub fn advance_adu(&mut self, adu: SlotId, decided: &[(SlotId, Value)]) -> Vec<Outbound> {
        if adu <= self.adu {
            return Vec::new();
        }

        let mut lost = Vec::new();
        for (slot, value) in decided {
            if *slot <= self.adu || *slot > adu {
                continue;
            }
            let Some(entry) = self.slots.get(*slot) else {
                continue;
            };
            if !entry.own {
                continue;
            }
            if let Some(own) = &entry.value {
                if own != value {
                    tracing::warn!(
                        "Proposer {} lost slot {} to another value, requeueing its own",
                        self.id,
                        slot
                    );
                    lost.push(own.clone());
                }
            }
        }
        for value in lost.into_iter().rev() {
            self.queue.push_front(value);
        }

        self.adu = adu;
        self.slots.compact(adu + 1);
        if self.next_slot <= adu {
            self.next_slot = adu + 1;
        }
        self.fill_pipeline()
    }

    /// A round seen anywhere else, so the next round can start above it.
    pub fn observe_round(&mut self, round: ProposerRound) {
        self.highest_seen = self.highest_seen.max(round.counter);
    }

    pub fn phase_one_timeout(&mut self) -> Vec<Outbound> {
        if !self.is_leader() || self.phase != Phase::One {
            return Vec::new();
        }
        tracing::info!(
            "Proposer {} phase 1 timed out in round {} with {} promises",
            self.id,
            self.crnd,
            self.promises.len()
        );
        self.start_phase_one()
    }

    /// Resend outstanding accepts if nothing was decided since the last tick.
    pub fn phase_two_timeout(&mut self) -> Vec<Outbound> {
        if !self.is_leader() || self.phase != Phase::Two {
            return Vec::new();
        }
        if self.adu > self.progress_mark {
            self.progress_mark = self.adu;
            return Vec::new();
        }

        let mut out = Vec::new();
        for slot in self.adu + 1..self.next_slot {
            let Some(entry) = self.slots.get_mut(slot) else {
                continue;
            };
            let Some(value) = entry.value.clone() else {
                continue;
            };
            entry.resends += 1;
            if entry.resends > self.resend_threshold {
                tracing::warn!(
                    "Proposer {} gave up resending slot {} after {} attempts, restarting phase 1",
                    self.id,
                    slot,
                    self.resend_threshold
                );
                return self.start_phase_one();
            }
            out.push(Outbound::Broadcast(PaxosMessage::Accept(Accept {
                sender: self.id,
                round: self.crnd,
                slot,
                value,
                epoch_vector: self.epoch_vector.clone(),
            })));
        }

        if !out.is_empty() {
            tracing::debug!(
                "Proposer {} resending {} accepts from slot {}",
                self.id,
                out.len(),
                self.adu + 1
            );
        }
        out
    }
}
