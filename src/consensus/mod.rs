//! actix actors driving the Paxos state machines of one replica.

pub mod acceptor;
pub mod learner;
pub mod messages;
pub mod proposer;
pub mod replica;

pub use acceptor::AcceptorActor;
pub use learner::LearnerActor;
pub use messages::{
    AduAdvanced, Decided, GetAcceptorState, GetLearnerStatus, GetProposerStatus,
    HandlePaxosMessage, ProposeValue, SetAcceptorState, SetLowSlot, Trust, UpdateEpochVector,
};
pub use proposer::ProposerActor;
pub use replica::{Replica, ReplicaHandle};
