use actix::prelude::*;
use futures::channel::oneshot;

use crate::paxos::acceptor::AcceptorSnapshot;
use crate::paxos::learner::LearnerStatus;
use crate::paxos::proposer::ProposerStatus;
use crate::paxos::rpc::PaxosMessage;
use crate::paxos::types::{EpochVector, ProposerRound, ReplicaId, SlotId, Value};
use crate::util::errors::Result;

/// Inbound peer message, already demultiplexed to the role that handles it
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct HandlePaxosMessage {
    pub from: ReplicaId,
    pub message: PaxosMessage,
}

/// Leader-detector output: `0` is now trusted as leader
#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "()")]
pub struct Trust(pub ReplicaId);

/// New membership view for this replica
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct UpdateEpochVector(pub EpochVector);

/// Submit a value for ordering (only the leader accepts it)
#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<()>")]
pub struct ProposeValue(pub Value);

/// Learner to proposer: every slot up to `adu` is decided
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct AduAdvanced {
    pub adu: SlotId,
    /// Values delivered by this advance, in slot order
    pub decided: Vec<(SlotId, Value)>,
    /// Highest round the learner has seen in any vote
    pub highest_round: ProposerRound,
}

/// Copy the acceptor's votes after `after_slot`, then pause the acceptor
/// until `release` fires or its sender is dropped.
///
/// Only one handoff may be outstanding per acceptor at a time; a second
/// request is not answered until the first is released.
#[derive(Message)]
#[rtype(result = "AcceptorSnapshot")]
pub struct GetAcceptorState {
    pub after_slot: SlotId,
    pub release: oneshot::Receiver<()>,
}

/// Install votes taken from another acceptor
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct SetAcceptorState(pub AcceptorSnapshot);

/// Raise the acceptor's low-water mark
#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "()")]
pub struct SetLowSlot(pub SlotId);

/// Get proposer state (for debugging/monitoring)
#[derive(Message)]
#[rtype(result = "ProposerStatus")]
pub struct GetProposerStatus;

/// Get learner state (for debugging/monitoring)
#[derive(Message)]
#[rtype(result = "LearnerStatus")]
pub struct GetLearnerStatus;

/// A decided value, emitted once per slot in slot order
#[derive(Message, Debug, Clone, PartialEq, Eq)]
#[rtype(result = "()")]
pub struct Decided {
    pub slot: SlotId,
    pub value: Value,
}

macro_rules! plain_response {
    ($($ty:ty),*) => {
        $(
            impl<A, M> actix::dev::MessageResponse<A, M> for $ty
            where
                A: Actor,
                M: Message<Result = $ty>,
            {
                fn handle(
                    self,
                    _ctx: &mut A::Context,
                    tx: Option<actix::dev::OneshotSender<M::Result>>,
                ) {
                    if let Some(tx) = tx {
                        let _ = tx.send(self);
                    }
                }
            }
        )*
    };
}

plain_response!(AcceptorSnapshot, ProposerStatus, LearnerStatus);
