use actix::prelude::*;

use crate::paxos::rpc::{Outbound, PaxosMessage};
use crate::paxos::types::ReplicaId;

/// Message to send a peer message to one replica
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct SendPaxosMessage {
    pub from: ReplicaId,
    pub to: ReplicaId,
    pub message: PaxosMessage,
}

/// Message to broadcast a peer message to every replica, the sender included
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct BroadcastPaxosMessage {
    pub from: ReplicaId,
    pub message: PaxosMessage,
}

/// Outgoing side of the transport as seen by one replica's actors.
///
/// Sends are fire-and-forget; retrying is the protocol's job.
#[derive(Clone)]
pub struct NetworkSink {
    id: ReplicaId,
    send: Recipient<SendPaxosMessage>,
    broadcast: Recipient<BroadcastPaxosMessage>,
}

impl NetworkSink {
    pub fn new(
        id: ReplicaId,
        send: Recipient<SendPaxosMessage>,
        broadcast: Recipient<BroadcastPaxosMessage>,
    ) -> Self {
        Self {
            id,
            send,
            broadcast,
        }
    }

    pub fn dispatch(&self, outbound: Vec<Outbound>) {
        for out in outbound {
            match out {
                Outbound::Unicast(to, message) => self.send.do_send(SendPaxosMessage {
                    from: self.id,
                    to,
                    message,
                }),
                Outbound::Broadcast(message) => self.broadcast.do_send(BroadcastPaxosMessage {
                    from: self.id,
                    message,
                }),
            }
        }
    }
}
