use actix::prelude::*;

use super::acceptor::AcceptorActor;
use super::learner::LearnerActor;
use super::messages::{Decided, HandlePaxosMessage, ProposeValue, Trust, UpdateEpochVector};
use super::proposer::ProposerActor;
use crate::config::PaxosConfig;
use crate::network::messages::NetworkSink;
use crate::paxos::rpc::PaxosMessage;
use crate::paxos::types::{EpochVector, ReplicaId};
use crate::util::errors::{PaxosError, Result};

/// Addresses of one replica's three role actors
#[derive(Clone)]
pub struct ReplicaHandle {
    pub id: ReplicaId,
    pub acceptor: Addr<AcceptorActor>,
    pub proposer: Addr<ProposerActor>,
    pub learner: Addr<LearnerActor>,
}

impl ReplicaHandle {
    /// Hand an inbound peer message to the role that handles it.
    ///
    /// Respects mailbox bounds: when the target is full the message is
    /// dropped and left to the protocol's retries.
    pub fn deliver(&self, from: ReplicaId, message: PaxosMessage) {
        let msg = HandlePaxosMessage { from, message };
        let result = match &msg.message {
            PaxosMessage::Prepare(_) | PaxosMessage::Accept(_) => {
                self.acceptor.try_send(msg).map_err(describe)
            }
            PaxosMessage::Promise(_) => self.proposer.try_send(msg).map_err(describe),
            PaxosMessage::Learn(_)
            | PaxosMessage::CatchUpRequest(_)
            | PaxosMessage::CatchUpResponse(_) => self.learner.try_send(msg).map_err(describe),
        };

        if let Err(reason) = result {
            tracing::warn!(
                "Replica {} dropped message from {}: {}",
                self.id,
                from,
                reason
            );
        }
    }

    /// Leader-detector notification for this replica
    pub fn trust(&self, leader: ReplicaId) {
        self.proposer.do_send(Trust(leader));
        self.learner.do_send(Trust(leader));
    }

    pub fn update_epoch_vector(&self, epoch_vector: EpochVector) {
        self.acceptor
            .do_send(UpdateEpochVector(epoch_vector.clone()));
        self.proposer
            .do_send(UpdateEpochVector(epoch_vector.clone()));
        self.learner.do_send(UpdateEpochVector(epoch_vector));
    }

    /// Where clients submit values
    pub fn proposals(&self) -> Recipient<ProposeValue> {
        self.proposer.clone().recipient()
    }
}

fn describe(err: SendError<HandlePaxosMessage>) -> &'static str {
    match err {
        SendError::Full(_) => "mailbox full",
        SendError::Closed(_) => "actor stopped",
    }
}

/// One MultiPaxos replica: an acceptor, a proposer and a learner
pub struct Replica;

impl Replica {
    /// Start the three role actors of `config.replica_id`.
    ///
    /// Must be called from within a running actix system.
    pub fn start(
        config: &PaxosConfig,
        network: NetworkSink,
        decided: Recipient<Decided>,
    ) -> Result<ReplicaHandle> {
        config.validate().map_err(PaxosError::InvalidConfig)?;

        let acceptor = AcceptorActor::new(config, network.clone()).start();
        let proposer = ProposerActor::new(config, network.clone()).start();
        let learner =
            LearnerActor::new(config, network, decided, proposer.clone().recipient()).start();

        tracing::info!(
            "Replica {} started ({} replicas, quorum {}, alpha {}, {:?} mode)",
            config.replica_id,
            config.replicas,
            config.quorum(),
            config.alpha,
            config.mode
        );

        Ok(ReplicaHandle {
            id: config.replica_id,
            acceptor,
            proposer,
            learner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::messages::{GetAcceptorState, GetLearnerStatus, GetProposerStatus};
    use crate::network::local::{AttachReplica, LocalNetwork, SetIsolated};
    use crate::paxos::mode::ConsensusMode;
    use crate::paxos::proposer::Phase;
    use crate::paxos::types::{SlotId, Value};
    use futures::channel::oneshot;
    use std::time::Duration;

    #[derive(Default)]
    struct Collector {
        decided: Vec<(SlotId, Value)>,
    }

    impl Actor for Collector {
        type Context = Context<Self>;
    }

    impl Handler<Decided> for Collector {
        type Result = ();

        fn handle(&mut self, msg: Decided, _ctx: &mut Self::Context) -> Self::Result {
            self.decided.push((msg.slot, msg.value));
        }
    }

    #[derive(Message)]
    #[rtype(result = "Vec<(SlotId, Value)>")]
    struct Snapshot;

    impl Handler<Snapshot> for Collector {
        type Result = Vec<(SlotId, Value)>;

        fn handle(&mut self, _msg: Snapshot, _ctx: &mut Self::Context) -> Self::Result {
            self.decided.clone()
        }
    }

    struct Cluster {
        network: Addr<LocalNetwork>,
        replicas: Vec<ReplicaHandle>,
        collectors: Vec<Addr<Collector>>,
    }

    impl Cluster {
        async fn start(replicas: usize, mode: ConsensusMode) -> Self {
            let network = LocalNetwork::default().start();
            let base = PaxosConfig {
                replicas,
                phase1_timeout_ms: 100,
                phase2_timeout_ms: 20,
                catchup_timeout_ms: 30,
                mode,
                ..Default::default()
            };

            let mut handles = Vec::new();
            let mut collectors = Vec::new();
            for id in 0..replicas {
                let collector = Collector::default().start();
                let handle = Replica::start(
                    &base.for_replica(id),
                    LocalNetwork::sink(&network, id),
                    collector.clone().recipient(),
                )
                .unwrap();
                network.send(AttachReplica(handle.clone())).await.unwrap();
                handles.push(handle);
                collectors.push(collector);
            }

            Cluster {
                network,
                replicas: handles,
                collectors,
            }
        }

        fn trust(&self, leader: ReplicaId) {
            for replica in &self.replicas {
                replica.trust(leader);
            }
        }

        async fn propose(&self, via: ReplicaId, payload: &str) -> Result<()> {
            self.replicas[via]
                .proposer
                .send(ProposeValue(Value::app_batch(payload.as_bytes().to_vec())))
                .await
                .unwrap()
        }

        /// Poll until replica `id` has decided `count` slots
        async fn wait_decided(&self, id: ReplicaId, count: usize) -> Vec<(SlotId, Value)> {
            for _ in 0..200 {
                let decided = self.collectors[id].send(Snapshot).await.unwrap();
                if decided.len() >= count {
                    return decided;
                }
                actix_rt::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("replica {} did not decide {} slots in time", id, count);
        }
    }

    async fn wait_phase_two(replica: &ReplicaHandle) {
        for _ in 0..200 {
            let status = replica.proposer.send(GetProposerStatus).await.unwrap();
            if status.phase == Phase::Two {
                return;
            }
            actix_rt::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("proposer {} never reached phase 2", replica.id);
    }

    /// Slots the acceptor has voted in
    async fn voted_slots(replica: &ReplicaHandle) -> Vec<SlotId> {
        let snapshot = replica
            .acceptor
            .send(GetAcceptorState {
                after_slot: 0,
                release: oneshot::channel().1,
            })
            .await
            .unwrap();
        snapshot.slots.iter().map(|(slot, _, _)| *slot).collect()
    }

    fn payloads(decided: &[(SlotId, Value)]) -> Vec<&[u8]> {
        decided.iter().map(|(_, value)| value.payload()).collect()
    }

    #[actix_rt::test]
    async fn test_cluster_decides_in_order() {
        let cluster = Cluster::start(3, ConsensusMode::Plain).await;
        cluster.trust(0);

        for payload in ["a", "b", "c", "d", "e"] {
            cluster.propose(0, payload).await.unwrap();
        }

        for id in 0..3 {
            let decided = cluster.wait_decided(id, 5).await;
            let slots: Vec<SlotId> = decided.iter().map(|(slot, _)| *slot).collect();
            assert_eq!(slots, vec![1, 2, 3, 4, 5]);
            assert_eq!(
                payloads(&decided),
                vec![&b"a"[..], &b"b"[..], &b"c"[..], &b"d"[..], &b"e"[..]]
            );
        }

        let status = cluster.replicas[0]
            .proposer
            .send(GetProposerStatus)
            .await
            .unwrap();
        assert_eq!(status.phase, Phase::Two);
        assert_eq!(status.leader, Some(0));
    }

    #[actix_rt::test]
    async fn test_follower_rejects_proposals() {
        let cluster = Cluster::start(3, ConsensusMode::Plain).await;
        cluster.trust(0);

        let err = cluster.propose(1, "x").await.unwrap_err();
        assert!(matches!(err, PaxosError::NotLeader(Some(0))));
    }

    #[actix_rt::test]
    async fn test_isolated_replica_catches_up() {
        let cluster = Cluster::start(3, ConsensusMode::Plain).await;
        cluster.trust(0);
        cluster
            .network
            .send(SetIsolated {
                replica: 2,
                isolated: true,
            })
            .await
            .unwrap();

        cluster.propose(0, "a").await.unwrap();
        cluster.propose(0, "b").await.unwrap();
        cluster.wait_decided(0, 2).await;
        cluster.wait_decided(1, 2).await;
        assert!(cluster.collectors[2]
            .send(Snapshot)
            .await
            .unwrap()
            .is_empty());

        cluster
            .network
            .send(SetIsolated {
                replica: 2,
                isolated: false,
            })
            .await
            .unwrap();
        cluster.propose(0, "c").await.unwrap();

        let decided = cluster.wait_decided(2, 3).await;
        assert_eq!(
            payloads(&decided),
            vec![&b"a"[..], &b"b"[..], &b"c"[..]]
        );
        let status = cluster.replicas[2]
            .learner
            .send(GetLearnerStatus)
            .await
            .unwrap();
        assert_eq!(status.adu, 3);
    }

    #[actix_rt::test]
    async fn test_leader_change_keeps_decided_prefix() {
        let cluster = Cluster::start(3, ConsensusMode::EpochAware).await;
        cluster.trust(0);
        cluster.propose(0, "a").await.unwrap();
        for id in 0..3 {
            cluster.wait_decided(id, 1).await;
        }

        cluster.trust(1);
        cluster.propose(1, "b").await.unwrap();
        for id in 0..3 {
            let decided = cluster.wait_decided(id, 2).await;
            assert_eq!(payloads(&decided), vec![&b"a"[..], &b"b"[..]]);
        }

        let status = cluster.replicas[1]
            .proposer
            .send(GetProposerStatus)
            .await
            .unwrap();
        assert_eq!(status.leader, Some(1));
        assert_eq!(status.round.owner, 1);
        assert!(cluster.propose(0, "c").await.is_err());
    }

    #[actix_rt::test]
    async fn test_restarted_acceptor_ignores_stale_accepts() {
        let cluster = Cluster::start(3, ConsensusMode::EpochAware).await;
        cluster.trust(0);
        wait_phase_two(&cluster.replicas[0]).await;

        // Replica 1 comes back in a new incarnation the others have not seen
        cluster.replicas[1].update_epoch_vector(EpochVector::from_entries(vec![0, 1, 0]));
        cluster.propose(0, "a").await.unwrap();
        for id in 0..3 {
            let decided = cluster.wait_decided(id, 1).await;
            assert_eq!(payloads(&decided), vec![&b"a"[..]]);
        }
        assert!(voted_slots(&cluster.replicas[1]).await.is_empty());

        for replica in &cluster.replicas {
            replica.update_epoch_vector(EpochVector::from_entries(vec![0, 1, 0]));
        }
        cluster.propose(0, "b").await.unwrap();
        for id in 0..3 {
            let decided = cluster.wait_decided(id, 2).await;
            assert_eq!(payloads(&decided), vec![&b"a"[..], &b"b"[..]]);
        }

        let mut voted = Vec::new();
        for _ in 0..200 {
            voted = voted_slots(&cluster.replicas[1]).await;
            if voted.contains(&2) {
                break;
            }
            actix_rt::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(voted.contains(&2));
    }
}
