use actix::prelude::*;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::batch::encode_batch;
use super::messages::{ClientStatus, Flush, GetClientStatus, SetProposer, SubmitCommand};
use crate::config::ClientConfig;
use crate::consensus::messages::ProposeValue;
use crate::util::errors::{PaxosError, Result};

/// Buffers commands and proposes them in batches
pub struct Client {
    config: ClientConfig,
    proposer: Option<Recipient<ProposeValue>>,
    pending_commands: VecDeque<PendingCommand>,
    total_commands: u64,
    batches_proposed: u64,
    batches_rejected: u64,
    batch_timer: Option<SpawnHandle>,
}

struct PendingCommand {
    id: u64,
    data: Vec<u8>,
    submitted_at: Instant,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Client {
            config,
            proposer: None,
            pending_commands: VecDeque::new(),
            total_commands: 0,
            batches_proposed: 0,
            batches_rejected: 0,
            batch_timer: None,
        }
    }

    fn flush_batch(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.batch_timer.take() {
            ctx.cancel_future(handle);
        }
        if self.pending_commands.is_empty() {
            return;
        }

        let proposer = match &self.proposer {
            Some(proposer) => proposer.clone(),
            None => {
                tracing::warn!("Cannot flush batch: proposer not set");
                return;
            }
        };

        let batch_size = self.pending_commands.len().min(self.config.max_batch_size);
        let batch: Vec<PendingCommand> = self.pending_commands.drain(..batch_size).collect();
        let first_id = batch[0].id;
        let oldest = batch[0].submitted_at.elapsed();
        let commands: Vec<Vec<u8>> = batch.into_iter().map(|command| command.data).collect();

        let value = match encode_batch(&commands) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to encode batch starting at {}: {}", first_id, e);
                self.batches_rejected += 1;
                return;
            }
        };

        tracing::debug!(
            "Flushing batch of {} commands from {} ({} bytes, oldest waited {:?})",
            batch_size,
            first_id,
            value.payload().len(),
            oldest
        );

        // Enqueued now so batches reach the proposer in flush order
        let request = proposer.send(ProposeValue(value));
        ctx.spawn(request.into_actor(self).map(move |result, act, _ctx| match result {
            Ok(Ok(())) => {
                act.batches_proposed += 1;
            }
            Ok(Err(e)) => {
                tracing::error!("Batch starting at {} rejected: {}", first_id, e);
                act.batches_rejected += 1;
            }
            Err(e) => {
                tracing::error!("Failed to send batch starting at {}: {}", first_id, e);
                act.batches_rejected += 1;
            }
        }));

        // Commands beyond one batch go out in the next window
        if !self.pending_commands.is_empty() {
            self.schedule_batch_flush(ctx);
        }
    }

    fn schedule_batch_flush(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.batch_timer.take() {
            ctx.cancel_future(handle);
        }

        let handle = ctx.run_later(self.config.batch_window(), |act, ctx| {
            act.batch_timer = None;
            act.flush_batch(ctx);
        });

        self.batch_timer = Some(handle);
    }
}

impl Actor for Client {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            "Client actor started (window {:?}, max batch {})",
            Duration::from_millis(self.config.batch_window_ms),
            self.config.max_batch_size
        );
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        tracing::info!("Client actor stopped");
        self.flush_batch(ctx);
    }
}

impl Handler<SetProposer> for Client {
    type Result = ();

    fn handle(&mut self, msg: SetProposer, ctx: &mut Self::Context) -> Self::Result {
        self.proposer = Some(msg.0);
        tracing::info!("Client proposer set");
        if !self.pending_commands.is_empty() && self.batch_timer.is_none() {
            self.schedule_batch_flush(ctx);
        }
    }
}

impl Handler<SubmitCommand> for Client {
    type Result = Result<u64>;

    fn handle(&mut self, msg: SubmitCommand, ctx: &mut Self::Context) -> Self::Result {
        if self.proposer.is_none() {
            return Err(PaxosError::Mailbox("proposer not connected".to_string()));
        }

        self.total_commands += 1;
        let id = self.total_commands;

        tracing::debug!("Client queued command {} ({} bytes)", id, msg.data.len());

        self.pending_commands.push_back(PendingCommand {
            id,
            data: msg.data,
            submitted_at: Instant::now(),
        });

        if self.pending_commands.len() >= self.config.max_batch_size {
            tracing::debug!("Batch size reached, flushing immediately");
            self.flush_batch(ctx);
        } else if self.batch_timer.is_none() {
            self.schedule_batch_flush(ctx);
        }

        Ok(id)
    }
}

impl Handler<Flush> for Client {
    type Result = ();

    fn handle(&mut self, _msg: Flush, ctx: &mut Self::Context) -> Self::Result {
        while !self.pending_commands.is_empty() && self.proposer.is_some() {
            self.flush_batch(ctx);
        }
    }
}

impl Handler<GetClientStatus> for Client {
    type Result = ClientStatus;

    fn handle(&mut self, _msg: GetClientStatus, _ctx: &mut Self::Context) -> Self::Result {
        ClientStatus {
            connected: self.proposer.is_some(),
            pending_commands: self.pending_commands.len(),
            total_commands: self.total_commands,
            batches_proposed: self.batches_proposed,
            batches_rejected: self.batches_rejected,
        }
    }
}
