//! The differential-state log: one entry per round, ordered by round.

use std::collections::BTreeMap;

use roundsync_core::State;

use crate::diff::{DiffState, RoundNo};

/// Round-indexed log of [`DiffState`]s. Rounds are unique; iteration is in
/// ascending round order.
#[derive(Debug, Default)]
pub struct DiffLog {
    entries: BTreeMap<RoundNo, DiffState>,
}

impl DiffLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a diff under its round. Rejected (returning false) when an
    /// entry for that round already exists.
    pub fn insert(&mut self, diff: DiffState) -> bool {
        match self.entries.entry(diff.round()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(diff);
                true
            }
        }
    }

    /// Entry for `round`, if present.
    pub fn get(&self, round: RoundNo) -> Option<&DiffState> {
        self.entries.get(&round)
    }

    /// Mutable entry for `round`, if present.
    pub fn get_mut(&mut self, round: RoundNo) -> Option<&mut DiffState> {
        self.entries.get_mut(&round)
    }

    /// Remove and return the entry for `round`.
    pub fn take(&mut self, round: RoundNo) -> Option<DiffState> {
        self.entries.remove(&round)
    }

    /// True when an entry for `round` exists.
    pub fn contains(&self, round: RoundNo) -> bool {
        self.entries.contains_key(&round)
    }

    /// Entries in ascending round order.
    pub fn iter(&self) -> impl Iterator<Item = &DiffState> {
        self.entries.values()
    }

    /// Mutable entries for rounds in `[from, to)`, ascending. Empty when
    /// `from >= to`.
    pub fn range_mut(
        &mut self,
        from: RoundNo,
        to: RoundNo,
    ) -> impl Iterator<Item = &mut DiffState> {
        let range = if from < to { from..to } else { from..from };
        self.entries.range_mut(range).map(|(_, diff)| diff)
    }

    /// Fold every entry with a round strictly greater than `round` into one
    /// aggregate state.
    pub fn diff_since(&self, round: RoundNo) -> State {
        let mut result = State::new();
        for (_, diff) in self.entries.range(round + 1..) {
            result.merge(diff.state());
        }
        result
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no rounds are recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
