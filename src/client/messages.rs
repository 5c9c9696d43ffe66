use actix::prelude::*;
use serde::Serialize;

use crate::consensus::messages::ProposeValue;
use crate::util::errors::Result;

/// Message to submit a command for ordering; returns its client-local id
#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<u64>")]
pub struct SubmitCommand {
    pub data: Vec<u8>,
}

/// Message to point the client at the proposer it should feed
#[derive(Message)]
#[rtype(result = "()")]
pub struct SetProposer(pub Recipient<ProposeValue>);

/// Message to push out buffered commands without waiting for the window
#[derive(Message)]
#[rtype(result = "()")]
pub struct Flush;

/// Message to get client status
#[derive(Message)]
#[rtype(result = "ClientStatus")]
pub struct GetClientStatus;

#[derive(Debug, Clone, Serialize, MessageResponse)]
pub struct ClientStatus {
    pub connected: bool,
    pub pending_commands: usize,
    pub total_commands: u64,
    pub batches_proposed: u64,
    pub batches_rejected: u64,
}
