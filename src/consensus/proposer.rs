use actix::prelude::*;
use rand::Rng;
use std::time::Duration;

use super::messages::{
    AduAdvanced, GetProposerStatus, HandlePaxosMessage, ProposeValue, Trust, UpdateEpochVector,
};
use crate::config::PaxosConfig;
use crate::network::messages::NetworkSink;
use crate::paxos::proposer::{Phase, ProposerState, ProposerStatus};
use crate::paxos::rpc::{Outbound, PaxosMessage};
use crate::paxos::types::{EpochVector, ProposerRound};
use crate::util::errors::Result;

/// Retry Prepare for the current round
struct PhaseOneTimeout;

impl Message for PhaseOneTimeout {
    type Result = ();
}

/// Resend outstanding accepts if nothing was decided
struct PhaseTwoTick;

impl Message for PhaseTwoTick {
    type Result = ();
}

/// Actor owning one replica's proposer state
pub struct ProposerActor {
    state: ProposerState,
    network: NetworkSink,
    phase1_timeout: Duration,
    phase2_timeout: Duration,
    mailbox_capacity: usize,
    timed_round: ProposerRound,
    phase_one_handle: Option<SpawnHandle>,
}

impl ProposerActor {
    pub fn new(config: &PaxosConfig, network: NetworkSink) -> Self {
        Self {
            state: ProposerState::new(
                config.replica_id,
                config.quorum(),
                config.alpha,
                config.resend_threshold,
                EpochVector::new(config.replicas),
                config.mode.policy(),
            ),
            network,
            phase1_timeout: config.phase1_timeout(),
            phase2_timeout: config.phase2_timeout(),
            mailbox_capacity: config.mailbox_capacity,
            timed_round: ProposerRound::BOTTOM,
            phase_one_handle: None,
        }
    }

    /// Send what the state machine produced and keep the phase 1 timer in
    /// step with the round it is waiting on.
    fn dispatch(&mut self, outbound: Vec<Outbound>, ctx: &mut Context<Self>) {
        self.network.dispatch(outbound);

        if self.state.phase() != Phase::One {
            self.cancel_phase_one_timeout(ctx);
        } else if self.phase_one_handle.is_none() || self.timed_round != self.state.round() {
            self.reset_phase_one_timeout(ctx);
        }
    }

    fn reset_phase_one_timeout(&mut self, ctx: &mut Context<Self>) {
        self.cancel_phase_one_timeout(ctx);

        // Jitter keeps competing proposers from retrying in lockstep
        let base = self.phase1_timeout.as_millis() as u64;
        let timeout_ms = rand::thread_rng().gen_range(base..=base + base / 2);
        self.timed_round = self.state.round();

        tracing::debug!(
            "Proposer {} phase 1 timeout for round {} in {}ms",
            self.state.id,
            self.timed_round,
            timeout_ms
        );

        let handle = ctx.run_later(Duration::from_millis(timeout_ms), |act, ctx| {
            act.phase_one_handle = None;
            ctx.notify(PhaseOneTimeout);
        });
        self.phase_one_handle = Some(handle);
    }

    fn cancel_phase_one_timeout(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.phase_one_handle.take() {
            ctx.cancel_future(handle);
        }
    }
}

impl Actor for ProposerActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.set_mailbox_capacity(self.mailbox_capacity);
        ctx.run_interval(self.phase2_timeout, |_act, ctx| {
            ctx.notify(PhaseTwoTick);
        });
        tracing::info!("Proposer actor {} started", self.state.id);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("Proposer actor {} stopped", self.state.id);
    }
}

impl Handler<HandlePaxosMessage> for ProposerActor {
    type Result = ();

    fn handle(&mut self, msg: HandlePaxosMessage, ctx: &mut Self::Context) -> Self::Result {
        match msg.message {
            PaxosMessage::Promise(promise) => {
                let out = self.state.handle_promise(promise);
                self.dispatch(out, ctx);
            }
            other => {
                tracing::debug!(
                    "Proposer {} ignoring unexpected message from {}: {:?}",
                    self.state.id,
                    msg.from,
                    other
                );
            }
        }
    }
}

impl Handler<Trust> for ProposerActor {
    type Result = ();

    fn handle(&mut self, msg: Trust, ctx: &mut Self::Context) -> Self::Result {
        let out = self.state.trust(msg.0);
        self.dispatch(out, ctx);
    }
}

impl Handler<UpdateEpochVector> for ProposerActor {
    type Result = ();

    fn handle(&mut self, msg: UpdateEpochVector, _ctx: &mut Self::Context) -> Self::Result {
        self.state.set_epoch_vector(msg.0);
    }
}

impl Handler<ProposeValue> for ProposerActor {
    type Result = Result<()>;

    fn handle(&mut self, msg: ProposeValue, ctx: &mut Self::Context) -> Self::Result {
        let out = self.state.submit(msg.0)?;
        self.dispatch(out, ctx);
        Ok(())
    }
}

impl Handler<AduAdvanced> for ProposerActor {
    type Result = ();

    fn handle(&mut self, msg: AduAdvanced, ctx: &mut Self::Context) -> Self::Result {
        self.state.observe_round(msg.highest_round);
        let out = self.state.advance_adu(msg.adu, &msg.decided);
        self.dispatch(out, ctx);
    }
}

impl Handler<PhaseOneTimeout> for ProposerActor {
    type Result = ();

    fn handle(&mut self, _msg: PhaseOneTimeout, ctx: &mut Self::Context) -> Self::Result {
        let out = self.state.phase_one_timeout();
        self.dispatch(out, ctx);
    }
}

impl Handler<PhaseTwoTick> for ProposerActor {
    type Result = ();

    fn handle(&mut self, _msg: PhaseTwoTick, ctx: &mut Self::Context) -> Self::Result {
        let out = self.state.phase_two_timeout();
        self.dispatch(out, ctx);
    }
}

impl Handler<GetProposerStatus> for ProposerActor {
    type Result = ProposerStatus;

    fn handle(&mut self, _msg: GetProposerStatus, _ctx: &mut Self::Context) -> Self::Result {
        self.state.status()
    }
}
