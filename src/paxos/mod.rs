//! Synchronous MultiPaxos state machines.
//!
//! Each role owns its slot map exclusively and turns one input message into
//! a list of outbound messages. The actors in [`crate::consensus`] drive them.

pub mod acceptor;
pub mod learner;
pub mod mode;
pub mod proposer;
pub mod quorum;
pub mod rpc;
pub mod slots;
pub mod types;

pub use acceptor::{AcceptorSnapshot, AcceptorState};
pub use learner::{LearnerOutput, LearnerState, LearnerStatus};
pub use mode::{ConsensusMode, QuorumPolicy};
pub use proposer::{Phase, ProposerState, ProposerStatus};
pub use rpc::{
    Accept, AcceptedSlot, CatchUpRequest, CatchUpResponse, Learn, Outbound, PaxosMessage,
    Prepare, Promise,
};
pub use types::{EpochVector, ProposerRound, ReplicaId, SlotId, Value, ValueKind};
