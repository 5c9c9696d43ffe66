//! Valid-quorum search over epoch-stamped messages.
//!
//! While a membership change is in flight, replicas may disagree about each
//! other's epochs. A set of promises or votes only counts as a quorum when no
//! two members conflict: they must come from distinct replicas, and neither
//! member may know the other to be running an older epoch than the one it
//! claims. The search walks `C(n, q)` subsets in lexicographic order and takes
//! the first conflict-free one.

use super::rpc::{Learn, Promise};
use super::types::{EpochVector, ReplicaId};

/// A message carrying its sender's epoch claims
pub trait EpochStamped {
    fn sender(&self) -> ReplicaId;

    fn epoch_vector(&self) -> &EpochVector;

    /// Epoch the sender was in when it sent the message
    fn sender_epoch(&self) -> u64 {
        self.epoch_vector().get(self.sender())
    }
}

impl EpochStamped for Promise {
    fn sender(&self) -> ReplicaId {
        self.sender
    }

    fn epoch_vector(&self) -> &EpochVector {
        &self.epoch_vector
    }
}

impl EpochStamped for Learn {
    fn sender(&self) -> ReplicaId {
        self.sender
    }

    fn epoch_vector(&self) -> &EpochVector {
        &self.epoch_vector
    }
}

/// Binomial coefficient `C(n, k)`, saturating on overflow.
pub fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u64 = 1;
    for i in 0..k {
        // Exact at every step: result is C(n, i) before this multiply
        result = match result.checked_mul((n - i) as u64) {
            Some(product) => product / (i as u64 + 1),
            None => return u64::MAX,
        };
    }
    result
}

/// The `rank`-th `k`-subset of `0..n` in lexicographic order.
pub fn unrank(mut rank: u64, n: usize, k: usize) -> Vec<usize> {
    let mut combination = Vec::with_capacity(k);
    let mut candidate = 0;
    for picked in 0..k {
        let remaining = k - picked;
        loop {
            // Subsets whose next element is `candidate`
            let starting_here = binomial(n - candidate - 1, remaining - 1);
            if rank < starting_here {
                break;
            }
            rank -= starting_here;
            candidate += 1;
        }
        combination.push(candidate);
        candidate += 1;
    }
    combination
}

/// Lexicographic iterator over the `k`-subsets of `0..n`, driven by rank.
#[derive(Debug, Clone)]
pub struct Combinations {
    n: usize,
    k: usize,
    rank: u64,
    total: u64,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            k,
            rank: 0,
            total: binomial(n, k),
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rank >= self.total {
            return None;
        }
        let combination = unrank(self.rank, self.n, self.k);
        self.rank += 1;
        Some(combination)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.rank) as usize;
        (left, Some(left))
    }
}

/// Whether two messages can not be members of the same quorum.
pub fn conflicts<A, B>(a: &A, b: &B) -> bool
where
    A: EpochStamped + ?Sized,
    B: EpochStamped + ?Sized,
{
    if a.sender() == b.sender() {
        return true;
    }
    a.epoch_vector().get(b.sender()) > b.sender_epoch()
        || b.epoch_vector().get(a.sender()) > a.sender_epoch()
}

/// Indices of the first conflict-free `quorum`-subset of `msgs`, if any.
pub fn find_valid_quorum<T: EpochStamped>(msgs: &[T], quorum: usize) -> Option<Vec<usize>> {
    let n = msgs.len();
    if n < quorum {
        return None;
    }

    let mut conflict = vec![false; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let c = conflicts(&msgs[i], &msgs[j]);
            conflict[i * n + j] = c;
            conflict[j * n + i] = c;
        }
    }

    Combinations::new(n, quorum).find(|combination| {
        combination.iter().enumerate().all(|(pos, &i)| {
            combination[pos + 1..]
                .iter()
                .all(|&j| !conflict[i * n + j])
        })
    })
}
