use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Position in the replicated log. Slots start at 1.
pub type SlotId = u64;

/// Replica ordinal, also the index into an [`EpochVector`]
pub type ReplicaId = usize;

/// A globally unique, totally ordered round tag.
///
/// Rounds compare by counter first and owner second, so two replicas can never
/// produce the same round. The bottom round has a zero counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposerRound {
    pub counter: u64,
    pub owner: ReplicaId,
}

impl ProposerRound {
    pub const BOTTOM: ProposerRound = ProposerRound {
        counter: 0,
        owner: 0,
    };

    pub fn new(counter: u64, owner: ReplicaId) -> Self {
        Self { counter, owner }
    }

    pub fn is_bottom(&self) -> bool {
        self.counter == 0
    }

    /// Next round owned by `owner` that is higher than both `self` and any
    /// counter observed so far.
    pub fn next_after(&self, highest_seen: u64, owner: ReplicaId) -> Self {
        Self {
            counter: self.counter.max(highest_seen) + 1,
            owner,
        }
    }
}

impl Ord for ProposerRound {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter
            .cmp(&other.counter)
            .then(self.owner.cmp(&other.owner))
    }
}

impl PartialOrd for ProposerRound {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ProposerRound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(r{},{})", self.owner, self.counter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Noop,
    AppBatch,
    Reconfig,
}

/// Opaque content to be decided for a slot. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value {
    kind: ValueKind,
    payload: Vec<u8>,
}

impl Value {
    pub fn noop() -> Self {
        Self {
            kind: ValueKind::Noop,
            payload: Vec::new(),
        }
    }

    pub fn app_batch(payload: Vec<u8>) -> Self {
        Self {
            kind: ValueKind::AppBatch,
            payload,
        }
    }

    pub fn reconfig(payload: Vec<u8>) -> Self {
        Self {
            kind: ValueKind::Reconfig,
            payload,
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_noop(&self) -> bool {
        self.kind == ValueKind::Noop
    }
}

/// Per-replica membership generation counters, indexed by replica ordinal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpochVector(Vec<u64>);

impl EpochVector {
    pub fn new(replicas: usize) -> Self {
        Self(vec![0; replicas])
    }

    pub fn from_entries(entries: Vec<u64>) -> Self {
        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entry for `replica`, zero if the vector does not cover it.
    pub fn get(&self, replica: ReplicaId) -> u64 {
        self.0.get(replica).copied().unwrap_or(0)
    }

    /// Increment this replica's own entry. Other entries are never lowered.
    pub fn bump(&mut self, own: ReplicaId) -> u64 {
        if own >= self.0.len() {
            self.0.resize(own + 1, 0);
        }
        self.0[own] += 1;
        self.0[own]
    }

    /// Entrywise maximum with `other`.
    pub fn merge(&mut self, other: &EpochVector) {
        if other.0.len() > self.0.len() {
            self.0.resize(other.0.len(), 0);
        }
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine = (*mine).max(*theirs);
        }
    }

    pub fn entries(&self) -> &[u64] {
        &self.0
    }
}

impl fmt::Display for EpochVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
