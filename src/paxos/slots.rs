use std::collections::VecDeque;

use super::types::{ProposerRound, ReplicaId, SlotId, Value};
use super::rpc::Learn;

/// Append-only store of per-slot records backed by a ring buffer.
///
/// Holds slots `[low, low + len)`. Slots that were never touched read as
/// `T::default()`. Evicting a prefix with [`SlotWindow::compact`] raises the
/// low-water mark; evicted slots can no longer be read or written.
#[derive(Debug, Clone)]
pub struct SlotWindow<T> {
    low: SlotId,
    entries: VecDeque<T>,
    max_seen: SlotId,
}

impl<T: Default> SlotWindow<T> {
    pub fn new() -> Self {
        Self {
            low: 1,
            entries: VecDeque::new(),
            max_seen: 0,
        }
    }

    /// Lowest slot still retained
    pub fn low(&self) -> SlotId {
        self.low
    }

    /// Highest slot ever written
    pub fn max_seen(&self) -> SlotId {
        self.max_seen
    }

    pub fn get(&self, slot: SlotId) -> Option<&T> {
        if slot < self.low {
            return None;
        }
        self.entries.get((slot - self.low) as usize)
    }

    /// Mutable access to `slot`, materializing default records up to it.
    ///
    /// Returns `None` for slots below the low-water mark.
    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut T> {
        if slot < self.low {
            return None;
        }
        let offset = (slot - self.low) as usize;
        while self.entries.len() <= offset {
            self.entries.push_back(T::default());
        }
        self.max_seen = self.max_seen.max(slot);
        self.entries.get_mut(offset)
    }

    /// Evict every slot strictly below `below`.
    pub fn compact(&mut self, below: SlotId) {
        if below <= self.low {
            return;
        }
        let drop = ((below - self.low) as usize).min(self.entries.len());
        self.entries.drain(..drop);
        self.low = below;
        self.max_seen = self.max_seen.max(below - 1);
    }

    /// Iterate over retained slots in `[from, to]`.
    pub fn range(&self, from: SlotId, to: SlotId) -> impl Iterator<Item = (SlotId, &T)> + '_ {
        let start = from.max(self.low);
        let end = to.min(self.low + self.entries.len() as SlotId - 1);
        (start..=end).filter_map(move |slot| self.get(slot).map(|entry| (slot, entry)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Default> Default for SlotWindow<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Vote state for one slot at an acceptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptorSlot {
    pub vrnd: ProposerRound,
    pub vval: Option<Value>,
}

/// Proposal state for one slot at a proposer
#[derive(Debug, Clone, Default)]
pub struct ProposerSlot {
    /// Value to send for this slot, if one has been chosen
    pub value: Option<Value>,
    /// Round of the vote the value was seeded from; bottom for a fresh value
    pub seeded_from: ProposerRound,
    /// Whether the value came from the client queue rather than a promise
    pub own: bool,
    /// Unacknowledged resends in the current round
    pub resends: u32,
}

/// Vote tally for one slot at a learner
#[derive(Debug, Clone, Default)]
pub struct LearnerSlot {
    pub rnd: ProposerRound,
    pub votes: Vec<Learn>,
    pub learned: Option<Value>,
    pub decided: bool,
    /// Set once a vote arrives whose epoch vector disagrees with ours
    pub epoch_conflict: bool,
}

impl LearnerSlot {
    pub fn has_vote_from(&self, sender: ReplicaId) -> bool {
        self.votes.iter().any(|vote| vote.sender == sender)
    }

    pub fn is_learned(&self) -> bool {
        self.learned.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_slots_read_as_default() {
        let mut window: SlotWindow<AcceptorSlot> = SlotWindow::new();
        assert!(window.get(3).is_none());

        window.get_mut(3).unwrap().vrnd = ProposerRound::new(1, 0);
        assert_eq!(window.max_seen(), 3);
        assert_eq!(window.get(1), Some(&AcceptorSlot::default()));
        assert!(!window.get(3).unwrap().vrnd.is_bottom());
    }

    #[test]
    fn test_compact_raises_low_water_mark() {
        let mut window: SlotWindow<AcceptorSlot> = SlotWindow::new();
        for slot in 1..=5 {
            window.get_mut(slot).unwrap().vrnd = ProposerRound::new(slot, 0);
        }

        window.compact(4);
        assert_eq!(window.low(), 4);
        assert_eq!(window.len(), 2);
        assert!(window.get(3).is_none());
        assert!(window.get_mut(2).is_none());
        assert_eq!(window.get(4).unwrap().vrnd, ProposerRound::new(4, 0));

        // Compacting past everything written still keeps slots contiguous
        window.compact(10);
        assert!(window.is_empty());
        assert_eq!(window.max_seen(), 9);
        window.get_mut(10).unwrap().vrnd = ProposerRound::new(1, 1);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_range_skips_evicted_slots() {
        let mut window: SlotWindow<LearnerSlot> = SlotWindow::new();
        window.get_mut(6).unwrap().decided = true;
        window.compact(3);

        let slots: Vec<SlotId> = window.range(1, 20).map(|(slot, _)| slot).collect();
        assert_eq!(slots, vec![3, 4, 5, 6]);
    }
}
