use actix::prelude::*;

use super::messages::{
    GetAcceptorState, HandlePaxosMessage, SetAcceptorState, SetLowSlot, UpdateEpochVector,
};
use crate::config::PaxosConfig;
use crate::network::messages::NetworkSink;
use crate::paxos::acceptor::{AcceptorSnapshot, AcceptorState};
use crate::paxos::rpc::{Outbound, PaxosMessage};
use crate::paxos::types::EpochVector;

/// Actor owning one replica's acceptor state
pub struct AcceptorActor {
    state: AcceptorState,
    network: NetworkSink,
    mailbox_capacity: usize,
}

impl AcceptorActor {
    pub fn new(config: &PaxosConfig, network: NetworkSink) -> Self {
        Self {
            state: AcceptorState::new(
                config.replica_id,
                EpochVector::new(config.replicas),
                config.retention,
                config.mode.policy(),
            ),
            network,
            mailbox_capacity: config.mailbox_capacity,
        }
    }
}

impl Actor for AcceptorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.set_mailbox_capacity(self.mailbox_capacity);
        tracing::info!("Acceptor actor {} started", self.state.id);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("Acceptor actor {} stopped", self.state.id);
    }
}

impl Handler<HandlePaxosMessage> for AcceptorActor {
    type Result = ();

    fn handle(&mut self, msg: HandlePaxosMessage, _ctx: &mut Self::Context) -> Self::Result {
        match msg.message {
            PaxosMessage::Prepare(prepare) => {
                if let Some((promise, to)) = self.state.handle_prepare(&prepare) {
                    self.network
                        .dispatch(vec![Outbound::Unicast(to, PaxosMessage::Promise(promise))]);
                }
            }
            PaxosMessage::Accept(accept) => {
                if let Some(learn) = self.state.handle_accept(&accept) {
                    self.network
                        .dispatch(vec![Outbound::Broadcast(PaxosMessage::Learn(learn))]);
                }
            }
            other => {
                tracing::debug!(
                    "Acceptor {} ignoring unexpected message from {}: {:?}",
                    self.state.id,
                    msg.from,
                    other
                );
            }
        }
    }
}

impl Handler<UpdateEpochVector> for AcceptorActor {
    type Result = ();

    fn handle(&mut self, msg: UpdateEpochVector, _ctx: &mut Self::Context) -> Self::Result {
        self.state.set_epoch_vector(msg.0);
    }
}

impl Handler<GetAcceptorState> for AcceptorActor {
    type Result = AcceptorSnapshot;

    fn handle(&mut self, msg: GetAcceptorState, ctx: &mut Self::Context) -> Self::Result {
        let snapshot = self.state.snapshot_after(msg.after_slot);
        tracing::info!(
            "Acceptor {} handing off {} slots after {}, pausing until released",
            self.state.id,
            snapshot.slots.len(),
            msg.after_slot
        );

        let release = msg.release;
        ctx.wait(
            async move {
                let _ = release.await;
            }
            .into_actor(self)
            .map(|_, act, _ctx| {
                tracing::info!("Acceptor {} released", act.state.id);
            }),
        );

        snapshot
    }
}

impl Handler<SetAcceptorState> for AcceptorActor {
    type Result = ();

    fn handle(&mut self, msg: SetAcceptorState, _ctx: &mut Self::Context) -> Self::Result {
        self.state.install(msg.0);
    }
}

impl Handler<SetLowSlot> for AcceptorActor {
    type Result = ();

    fn handle(&mut self, msg: SetLowSlot, _ctx: &mut Self::Context) -> Self::Result {
        tracing::debug!("Acceptor {} low slot raised to {}", self.state.id, msg.0);
        self.state.set_low_slot(msg.0);
    }
}
