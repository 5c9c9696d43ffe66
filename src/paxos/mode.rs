use serde::{Deserialize, Serialize};

use super::quorum::find_valid_quorum;
use super::rpc::{Accept, Learn, Promise};
use super::types::{EpochVector, ReplicaId};

/// Which quorum rules the replica runs with, fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMode {
    #[default]
    Plain,
    /// Tolerates membership changes while consensus runs (live replacement)
    EpochAware,
}

impl ConsensusMode {
    pub fn policy(self) -> Box<dyn QuorumPolicy> {
        match self {
            ConsensusMode::Plain => Box::new(Plain),
            ConsensusMode::EpochAware => Box::new(EpochAware { inner: Plain }),
        }
    }
}

/// Quorum and admission rules shared by the three roles
pub trait QuorumPolicy: Send {
    fn mode(&self) -> ConsensusMode;

    /// Whether an acceptor with `own` membership view may vote on `accept`.
    fn admits_accept(&self, own_id: ReplicaId, own: &EpochVector, accept: &Accept) -> bool;

    /// Indices of the promises forming a quorum, if one exists.
    fn promise_quorum(&self, promises: &[Promise], quorum: usize) -> Option<Vec<usize>>;

    /// Whether `vote` disagrees with the learner's membership view.
    fn vote_conflicts(&self, own: &EpochVector, vote: &Learn) -> bool;

    /// Whether same-round `votes` make the slot learned.
    fn learn_quorum(&self, votes: &[Learn], quorum: usize, epoch_conflict: bool) -> bool;
}

pub struct Plain;

impl QuorumPolicy for Plain {
    fn mode(&self) -> ConsensusMode {
        ConsensusMode::Plain
    }

    fn admits_accept(&self, _own_id: ReplicaId, _own: &EpochVector, _accept: &Accept) -> bool {
        true
    }

    fn promise_quorum(&self, promises: &[Promise], quorum: usize) -> Option<Vec<usize>> {
        (promises.len() >= quorum).then(|| (0..quorum).collect())
    }

    fn vote_conflicts(&self, _own: &EpochVector, _vote: &Learn) -> bool {
        false
    }

    fn learn_quorum(&self, votes: &[Learn], quorum: usize, _epoch_conflict: bool) -> bool {
        votes.len() >= quorum
    }
}

pub struct EpochAware {
    inner: Plain,
}

impl QuorumPolicy for EpochAware {
    fn mode(&self) -> ConsensusMode {
        ConsensusMode::EpochAware
    }

    fn admits_accept(&self, own_id: ReplicaId, own: &EpochVector, accept: &Accept) -> bool {
        self.inner.admits_accept(own_id, own, accept)
            && accept.epoch_vector.get(own_id) == own.get(own_id)
    }

    fn promise_quorum(&self, promises: &[Promise], quorum: usize) -> Option<Vec<usize>> {
        self.inner.promise_quorum(promises, quorum)?;
        find_valid_quorum(promises, quorum)
    }

    fn vote_conflicts(&self, own: &EpochVector, vote: &Learn) -> bool {
        vote.epoch_vector != *own
    }

    fn learn_quorum(&self, votes: &[Learn], quorum: usize, epoch_conflict: bool) -> bool {
        if !self.inner.learn_quorum(votes, quorum, epoch_conflict) {
            return false;
        }
        !epoch_conflict || find_valid_quorum(votes, quorum).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paxos::types::{ProposerRound, Value};

    fn accept_for(epochs: Vec<u64>) -> Accept {
        Accept {
            sender: 0,
            round: ProposerRound::new(1, 0),
            slot: 1,
            value: Value::noop(),
            epoch_vector: EpochVector::from_entries(epochs),
        }
    }

    fn promise(sender: ReplicaId, epochs: Vec<u64>) -> Promise {
        Promise {
            sender,
            round: ProposerRound::new(1, 0),
            accumulated_slots: Vec::new(),
            epoch_vector: EpochVector::from_entries(epochs),
        }
    }

    #[test]
    fn test_epoch_aware_rejects_accept_for_other_incarnation() {
        let own = EpochVector::from_entries(vec![0, 1, 0]);
        let stale = accept_for(vec![0, 0, 0]);
        let current = accept_for(vec![0, 1, 0]);
        // Only this replica's own entry matters
        let other_differs = accept_for(vec![3, 1, 0]);

        let plain = ConsensusMode::Plain.policy();
        assert!(plain.admits_accept(1, &own, &stale));

        let aware = ConsensusMode::EpochAware.policy();
        assert!(!aware.admits_accept(1, &own, &stale));
        assert!(aware.admits_accept(1, &own, &current));
        assert!(aware.admits_accept(1, &own, &other_differs));
    }

    #[test]
    fn test_promise_quorum_by_mode() {
        let promises = vec![promise(1, vec![0, 0, 0]), promise(2, vec![0, 1, 0])];

        let plain = ConsensusMode::Plain.policy();
        assert_eq!(plain.promise_quorum(&promises, 2), Some(vec![0, 1]));
        assert_eq!(plain.promise_quorum(&promises[..1], 2), None);

        let aware = ConsensusMode::EpochAware.policy();
        assert_eq!(aware.promise_quorum(&promises, 2), None);
    }

    #[test]
    fn test_mode_parses_from_config() {
        let parsed: ConsensusMode = serde_json::from_str("\"epoch_aware\"").unwrap();
        assert_eq!(parsed, ConsensusMode::EpochAware);
        assert_eq!(ConsensusMode::EpochAware.policy().mode(), ConsensusMode::EpochAware);
    }
}
