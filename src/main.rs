use actix::prelude::*;
use anyhow::Context as _;
use mpaxos::{
    client::{decode_batch, Client, Flush, GetClientStatus, SetProposer, SubmitCommand},
    config::Config,
    consensus::{Decided, GetLearnerStatus, GetProposerStatus, Replica},
    network::{AttachReplica, GetNetworkStats, LocalNetwork},
};
use std::time::Duration;

const DEMO_COMMANDS: usize = 20;
const DECISION_TIMEOUT: Duration = Duration::from_secs(5);

/// Logs every decided slot of one replica
struct DecisionLog {
    replica: usize,
    commands: usize,
}

impl Actor for DecisionLog {
    type Context = Context<Self>;
}

impl Handler<Decided> for DecisionLog {
    type Result = ();

    fn handle(&mut self, msg: Decided, _ctx: &mut Self::Context) -> Self::Result {
        match decode_batch(&msg.value) {
            Ok(commands) => {
                self.commands += commands.len();
                tracing::info!(
                    "Replica {} decided slot {}: {:?} with {} commands",
                    self.replica,
                    msg.slot,
                    msg.value.kind(),
                    commands.len()
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Replica {} decided slot {} with undecodable value: {}",
                    self.replica,
                    msg.slot,
                    e
                );
            }
        }
    }
}

#[derive(Message)]
#[rtype(result = "usize")]
struct CommandsDecided;

impl Handler<CommandsDecided> for DecisionLog {
    type Result = usize;

    fn handle(&mut self, _msg: CommandsDecided, _ctx: &mut Self::Context) -> Self::Result {
        self.commands
    }
}

#[actix_rt::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_config_arg(&args) {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path))?,
        None => Config::default(),
    };

    tracing::info!(
        "Starting {} replica cluster in {:?} mode",
        config.paxos.replicas,
        config.paxos.mode
    );

    let network = LocalNetwork::default().start();
    let mut replicas = Vec::new();
    let mut logs = Vec::new();
    for id in 0..config.paxos.replicas {
        let log = DecisionLog {
            replica: id,
            commands: 0,
        }
        .start();
        let handle = Replica::start(
            &config.paxos.for_replica(id),
            LocalNetwork::sink(&network, id),
            log.clone().recipient(),
        )?;
        network.send(AttachReplica(handle.clone())).await?;
        replicas.push(handle);
        logs.push(log);
    }

    // Static leader; there is no failure detector in this demo
    for replica in &replicas {
        replica.trust(0);
    }

    let client = Client::new(config.client.clone()).start();
    client.send(SetProposer(replicas[0].proposals())).await?;

    for n in 0..DEMO_COMMANDS {
        let data = format!("command-{}", n).into_bytes();
        client.send(SubmitCommand { data }).await??;
    }
    client.send(Flush).await?;

    let all_decided = async {
        loop {
            let mut done = true;
            for log in &logs {
                if log.send(CommandsDecided).await? < DEMO_COMMANDS {
                    done = false;
                }
            }
            if done {
                return Ok::<_, MailboxError>(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    match tokio::time::timeout(DECISION_TIMEOUT, all_decided).await {
        Ok(result) => result?,
        Err(_) => tracing::warn!(
            "Not every replica decided {} commands within {:?}",
            DEMO_COMMANDS,
            DECISION_TIMEOUT
        ),
    }

    for replica in &replicas {
        let proposer = replica.proposer.send(GetProposerStatus).await?;
        let learner = replica.learner.send(GetLearnerStatus).await?;
        println!("{}", serde_json::to_string(&proposer)?);
        println!("{}", serde_json::to_string(&learner)?);
    }
    println!(
        "{}",
        serde_json::to_string(&client.send(GetClientStatus).await?)?
    );

    let stats = network.send(GetNetworkStats).await?;
    tracing::info!(
        "Network delivered {} messages, dropped {}",
        stats.delivered,
        stats.dropped
    );

    tracing::info!("Shutting down...");
    System::current().stop();
    Ok(())
}

fn parse_config_arg(args: &[String]) -> Option<&str> {
    args.iter()
        .skip(1)
        .find_map(|arg| arg.strip_prefix("--config="))
}
