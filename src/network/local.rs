use actix::prelude::*;
use std::collections::{BTreeMap, HashSet};

use super::codec::{self, Envelope};
use super::messages::{BroadcastPaxosMessage, NetworkSink, SendPaxosMessage};
use crate::consensus::replica::ReplicaHandle;
use crate::paxos::rpc::PaxosMessage;
use crate::paxos::types::ReplicaId;

/// Register a replica so messages addressed to it can be delivered
#[derive(Message)]
#[rtype(result = "()")]
pub struct AttachReplica(pub ReplicaHandle);

/// Drop every message to or from a replica while isolated
#[derive(Message)]
#[rtype(result = "()")]
pub struct SetIsolated {
    pub replica: ReplicaId,
    pub isolated: bool,
}

/// Get delivery counters (for debugging/monitoring)
#[derive(Message)]
#[rtype(result = "NetworkStats")]
pub struct GetNetworkStats;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, MessageResponse)]
pub struct NetworkStats {
    pub delivered: u64,
    pub dropped: u64,
}

/// In-process transport connecting the replicas of one cluster.
///
/// Every message goes through the wire codec so what arrives is exactly what
/// a remote peer would decode.
#[derive(Default)]
pub struct LocalNetwork {
    replicas: BTreeMap<ReplicaId, ReplicaHandle>,
    isolated: HashSet<ReplicaId>,
    stats: NetworkStats,
}

impl LocalNetwork {
    /// Outgoing sink for replica `id` backed by this network
    pub fn sink(addr: &Addr<LocalNetwork>, id: ReplicaId) -> NetworkSink {
        NetworkSink::new(id, addr.clone().recipient(), addr.clone().recipient())
    }

    fn route(&mut self, from: ReplicaId, to: ReplicaId, message: PaxosMessage) {
        if self.isolated.contains(&from) || self.isolated.contains(&to) {
            self.stats.dropped += 1;
            return;
        }
        let Some(replica) = self.replicas.get(&to) else {
            tracing::warn!("No replica {} attached, dropping message from {}", to, from);
            self.stats.dropped += 1;
            return;
        };

        let envelope = Envelope { from, message };
        match codec::encode(&envelope).and_then(|bytes| codec::decode(&bytes)) {
            Ok(envelope) => {
                replica.deliver(envelope.from, envelope.message);
                self.stats.delivered += 1;
            }
            Err(e) => {
                tracing::error!("Failed to encode message from {} to {}: {}", from, to, e);
                self.stats.dropped += 1;
            }
        }
    }
}

impl Actor for LocalNetwork {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("Local network started");
    }
}

impl Handler<AttachReplica> for LocalNetwork {
    type Result = ();

    fn handle(&mut self, msg: AttachReplica, _ctx: &mut Self::Context) -> Self::Result {
        tracing::info!("Attaching replica {}", msg.0.id);
        self.replicas.insert(msg.0.id, msg.0);
    }
}

impl Handler<SetIsolated> for LocalNetwork {
    type Result = ();

    fn handle(&mut self, msg: SetIsolated, _ctx: &mut Self::Context) -> Self::Result {
        tracing::info!(
            "Replica {} {}",
            msg.replica,
            if msg.isolated { "isolated" } else { "reconnected" }
        );
        if msg.isolated {
            self.isolated.insert(msg.replica);
        } else {
            self.isolated.remove(&msg.replica);
        }
    }
}

impl Handler<SendPaxosMessage> for LocalNetwork {
    type Result = ();

    fn handle(&mut self, msg: SendPaxosMessage, _ctx: &mut Self::Context) -> Self::Result {
        self.route(msg.from, msg.to, msg.message);
    }
}

impl Handler<BroadcastPaxosMessage> for LocalNetwork {
    type Result = ();

    fn handle(&mut self, msg: BroadcastPaxosMessage, _ctx: &mut Self::Context) -> Self::Result {
        let targets: Vec<ReplicaId> = self.replicas.keys().copied().collect();
        for to in targets {
            self.route(msg.from, to, msg.message.clone());
        }
    }
}

impl Handler<GetNetworkStats> for LocalNetwork {
    type Result = NetworkStats;

    fn handle(&mut self, _msg: GetNetworkStats, _ctx: &mut Self::Context) -> Self::Result {
        self.stats
    }
}
