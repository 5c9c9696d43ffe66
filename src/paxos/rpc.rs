use serde::{Deserialize, Serialize};

use super::types::{EpochVector, ProposerRound, ReplicaId, SlotId, Value};

/// Phase 1a - sent by a proposer that wants to own `candidate_round`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prepare {
    pub sender: ReplicaId,
    pub candidate_round: ProposerRound,
    /// Proposer's all-decided-up-to frontier; votes below it are not reported
    pub slot: SlotId,
}

/// A vote reported inside a promise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedSlot {
    pub slot: SlotId,
    pub vrnd: ProposerRound,
    pub vval: Value,
}

/// Phase 1b - acceptor's answer to a prepare
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promise {
    pub sender: ReplicaId,
    pub round: ProposerRound,
    pub accumulated_slots: Vec<AcceptedSlot>,
    pub epoch_vector: EpochVector,
}

/// Phase 2a - proposer asks acceptors to vote for `value` in `slot`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accept {
    pub sender: ReplicaId,
    pub round: ProposerRound,
    pub slot: SlotId,
    pub value: Value,
    /// Proposer's view of the membership when the accept was sent
    pub epoch_vector: EpochVector,
}

/// Phase 2b - acceptor's vote, broadcast to every learner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Learn {
    pub sender: ReplicaId,
    pub slot: SlotId,
    pub round: ProposerRound,
    pub value: Value,
    pub epoch_vector: EpochVector,
}

/// Lagging learner asks the leader for decided values in inclusive ranges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchUpRequest {
    pub sender: ReplicaId,
    pub ranges: Vec<(SlotId, SlotId)>,
}

/// Decided values the leader holds inside the requested ranges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchUpResponse {
    pub sender: ReplicaId,
    pub decided: Vec<(SlotId, Value)>,
}

/// Wrapper for all peer messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaxosMessage {
    Prepare(Prepare),
    Promise(Promise),
    Accept(Accept),
    Learn(Learn),
    CatchUpRequest(CatchUpRequest),
    CatchUpResponse(CatchUpResponse),
}

impl PaxosMessage {
    pub fn sender(&self) -> ReplicaId {
        match self {
            PaxosMessage::Prepare(msg) => msg.sender,
            PaxosMessage::Promise(msg) => msg.sender,
            PaxosMessage::Accept(msg) => msg.sender,
            PaxosMessage::Learn(msg) => msg.sender,
            PaxosMessage::CatchUpRequest(msg) => msg.sender,
            PaxosMessage::CatchUpResponse(msg) => msg.sender,
        }
    }
}

/// Message produced by a state machine, to be handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Unicast(ReplicaId, PaxosMessage),
    Broadcast(PaxosMessage),
}
