use actix::prelude::*;
use std::time::Duration;

use super::messages::{
    AduAdvanced, Decided, GetLearnerStatus, HandlePaxosMessage, Trust, UpdateEpochVector,
};
use crate::config::PaxosConfig;
use crate::network::messages::NetworkSink;
use crate::paxos::learner::{LearnerOutput, LearnerState, LearnerStatus};
use crate::paxos::rpc::PaxosMessage;
use crate::paxos::types::EpochVector;

/// Look for gaps and retry unanswered catch-up requests
struct CatchUpTick;

impl Message for CatchUpTick {
    type Result = ();
}

/// Actor owning one replica's learner state
pub struct LearnerActor {
    state: LearnerState,
    network: NetworkSink,
    decided: Recipient<Decided>,
    proposer: Recipient<AduAdvanced>,
    catchup_timeout: Duration,
    mailbox_capacity: usize,
    // A request gets one full tick to be answered before it is retried
    request_aged: bool,
}

impl LearnerActor {
    pub fn new(
        config: &PaxosConfig,
        network: NetworkSink,
        decided: Recipient<Decided>,
        proposer: Recipient<AduAdvanced>,
    ) -> Self {
        Self {
            state: LearnerState::new(
                config.replica_id,
                config.quorum(),
                config.retention,
                EpochVector::new(config.replicas),
                config.mode.policy(),
            ),
            network,
            decided,
            proposer,
            catchup_timeout: config.catchup_timeout(),
            mailbox_capacity: config.mailbox_capacity,
            request_aged: false,
        }
    }

    fn emit(&mut self, output: LearnerOutput) {
        self.network.dispatch(output.outbound);

        if output.delivered.is_empty() {
            return;
        }
        for (slot, value) in &output.delivered {
            self.decided.do_send(Decided {
                slot: *slot,
                value: value.clone(),
            });
        }
        self.proposer.do_send(AduAdvanced {
            adu: self.state.adu(),
            decided: output.delivered,
            highest_round: self.state.highest_round(),
        });
    }
}

impl Actor for LearnerActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.set_mailbox_capacity(self.mailbox_capacity);
        ctx.run_interval(self.catchup_timeout, |_act, ctx| {
            ctx.notify(CatchUpTick);
        });
        tracing::info!("Learner actor {} started", self.state.id);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("Learner actor {} stopped", self.state.id);
    }
}

impl Handler<HandlePaxosMessage> for LearnerActor {
    type Result = ();

    fn handle(&mut self, msg: HandlePaxosMessage, _ctx: &mut Self::Context) -> Self::Result {
        match msg.message {
            PaxosMessage::Learn(learn) => {
                let output = self.state.handle_learn(learn);
                self.emit(output);
            }
            PaxosMessage::CatchUpRequest(request) => {
                let reply = self.state.handle_catch_up_request(&request);
                self.network.dispatch(vec![reply]);
            }
            PaxosMessage::CatchUpResponse(response) => {
                let output = self.state.handle_catch_up_response(response);
                self.request_aged = false;
                self.emit(output);
            }
            other => {
                tracing::debug!(
                    "Learner {} ignoring unexpected message from {}: {:?}",
                    self.state.id,
                    msg.from,
                    other
                );
            }
        }
    }
}

impl Handler<CatchUpTick> for LearnerActor {
    type Result = ();

    fn handle(&mut self, _msg: CatchUpTick, _ctx: &mut Self::Context) -> Self::Result {
        if self.state.is_catching_up() && !self.request_aged {
            self.request_aged = true;
            return;
        }
        self.request_aged = false;
        let out = self.state.catch_up_timeout();
        self.network.dispatch(out);
    }
}

impl Handler<Trust> for LearnerActor {
    type Result = ();

    fn handle(&mut self, msg: Trust, _ctx: &mut Self::Context) -> Self::Result {
        self.state.trust(msg.0);
    }
}

impl Handler<UpdateEpochVector> for LearnerActor {
    type Result = ();

    fn handle(&mut self, msg: UpdateEpochVector, _ctx: &mut Self::Context) -> Self::Result {
        self.state.set_epoch_vector(msg.0);
    }
}

impl Handler<GetLearnerStatus> for LearnerActor {
    type Result = LearnerStatus;

    fn handle(&mut self, _msg: GetLearnerStatus, _ctx: &mut Self::Context) -> Self::Result {
        self.state.status()
    }
}
