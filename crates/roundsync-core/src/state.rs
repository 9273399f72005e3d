//! The aggregate sync state: session name → latest seq-no.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;

use crate::crypto::{DigestBuilder, Sha256Digest};
use crate::error::Result;
use crate::leaf::{Leaf, SeqNo};
use crate::name::Name;
use crate::tlv::{self, types, TlvReader, TlvWriter};

/// Outcome of a [`State::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// The session was not known; a new leaf was inserted.
    Inserted,
    /// The session advanced from `old_seq`.
    Updated {
        /// Sequence number before the update.
        old_seq: SeqNo,
    },
    /// The offered seq-no was not newer; nothing changed.
    Unchanged,
}

impl UpdateResult {
    /// True when the update inserted or advanced a leaf.
    pub fn is_change(&self) -> bool {
        !matches!(self, UpdateResult::Unchanged)
    }
}

/// Set of [`Leaf`]s keyed by session name, iterated in canonical
/// (ascending name) order.
///
/// The root digest is the SHA-256 over the leaf digests in canonical order,
/// so two states holding the same `{session → seq}` mapping digest
/// identically on every node.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct State {
    leaves: BTreeMap<Name, Leaf>,
}

impl State {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or advance the leaf for `session_name`.
    ///
    /// A seq-no that does not exceed the current one is a no-op.
    pub fn update(&mut self, session_name: &Name, seq_no: SeqNo) -> UpdateResult {
        match self.leaves.get_mut(session_name) {
            None => {
                self.leaves
                    .insert(session_name.clone(), Leaf::new(session_name.clone(), seq_no));
                UpdateResult::Inserted
            }
            Some(leaf) if seq_no > leaf.seq_no() => {
                let old_seq = leaf.seq_no();
                leaf.set_seq_no(seq_no);
                UpdateResult::Updated { old_seq }
            }
            Some(_) => UpdateResult::Unchanged,
        }
    }

    /// Latest seq-no recorded for `session_name`, if any.
    pub fn get_seq_no(&self, session_name: &Name) -> Option<SeqNo> {
        self.leaves.get(session_name).map(Leaf::seq_no)
    }

    /// Root digest over the leaves in canonical order. The empty state
    /// digests to [`Sha256Digest::EMPTY`].
    pub fn get_digest(&self) -> Sha256Digest {
        let mut builder = DigestBuilder::new();
        for leaf in self.leaves.values() {
            builder.update(leaf.digest().as_ref());
        }
        builder.finish()
    }

    /// Fold every leaf of `other` into this state.
    pub fn merge(&mut self, other: &State) {
        for leaf in other.leaves() {
            self.update(leaf.session_name(), leaf.seq_no());
        }
    }

    /// Drop all leaves.
    pub fn reset(&mut self) {
        self.leaves.clear();
    }

    /// Leaves in canonical order.
    pub fn leaves(&self) -> impl Iterator<Item = &Leaf> {
        self.leaves.values()
    }

    /// Leaf for `session_name`, if any.
    pub fn get(&self, session_name: &Name) -> Option<&Leaf> {
        self.leaves.get(session_name)
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// True when no leaves are held.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Append the `State` TLV element to `writer`. Leaves are emitted in
    /// canonical order so equal states encode byte-identically.
    pub fn encode_into(&self, writer: &mut TlvWriter) {
        let mut inner = TlvWriter::new();
        for leaf in self.leaves.values() {
            let mut entry = TlvWriter::new();
            leaf.session_name().encode_into(&mut entry);
            entry.write_nonneg_block(types::SEQ_NO, leaf.seq_no());
            inner.write_block(types::STATE_LEAF, entry.bytes());
        }
        writer.write_block(types::STATE, inner.bytes());
    }

    /// The standalone `State` TLV encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = TlvWriter::new();
        self.encode_into(&mut writer);
        writer.into_bytes()
    }

    /// Decode from the value of a `State` TLV element. Elements other than
    /// `StateLeaf` are skipped.
    pub fn decode_value(value: &[u8]) -> Result<Self> {
        let mut reader = TlvReader::new(value);
        let mut state = State::new();
        while !reader.is_empty() {
            let (typ, entry) = reader.read_element()?;
            if typ != types::STATE_LEAF {
                continue;
            }
            let mut entry = TlvReader::new(entry);
            let session_name = Name::decode_from(&mut entry)?;
            let seq = entry.expect_element(types::SEQ_NO)?;
            state.update(&session_name, tlv::read_nonneg(seq)?);
        }
        Ok(state)
    }

    /// Decode a complete `State` TLV element from `reader`.
    pub fn decode_from(reader: &mut TlvReader<'_>) -> Result<Self> {
        let value = reader.expect_element(types::STATE)?;
        Self::decode_value(value)
    }

    /// Decode a standalone encoded state.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = TlvReader::new(bytes);
        Self::decode_from(&mut reader)
    }
}

impl AddAssign<&State> for State {
    fn add_assign(&mut self, other: &State) {
        self.merge(other);
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for leaf in self.leaves.values() {
            map.entry(&leaf.session_name().to_string(), &leaf.seq_no());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        Name::from_uri(uri)
    }

    #[test]
    fn test_update_outcomes() {
        let mut state = State::new();
        assert_eq!(state.update(&name("/a"), 3), UpdateResult::Inserted);
        assert_eq!(state.update(&name("/a"), 3), UpdateResult::Unchanged);
        assert_eq!(state.update(&name("/a"), 2), UpdateResult::Unchanged);
        assert_eq!(
            state.update(&name("/a"), 5),
            UpdateResult::Updated { old_seq: 3 }
        );
        assert_eq!(state.get_seq_no(&name("/a")), Some(5));
        assert_eq!(state.get_seq_no(&name("/b")), None);
    }

    #[test]
    fn test_empty_state_digest() {
        assert_eq!(State::new().get_digest(), Sha256Digest::EMPTY);
    }

    #[test]
    fn test_digest_independent_of_insertion_order() {
        let mut forward = State::new();
        forward.update(&name("/a"), 1);
        forward.update(&name("/b"), 2);

        let mut reverse = State::new();
        reverse.update(&name("/b"), 2);
        reverse.update(&name("/a"), 1);

        assert_eq!(forward.get_digest(), reverse.get_digest());
        assert_eq!(forward.encode(), reverse.encode());
    }

    #[test]
    fn test_digest_changes_with_content() {
        let mut state = State::new();
        state.update(&name("/a"), 1);
        let d1 = state.get_digest();
        state.update(&name("/a"), 2);
        assert_ne!(state.get_digest(), d1);
    }

    #[test]
    fn test_merge_takes_newer_seqs() {
        let mut local = State::new();
        local.update(&name("/a"), 5);
        local.update(&name("/b"), 1);

        let mut remote = State::new();
        remote.update(&name("/a"), 3);
        remote.update(&name("/b"), 4);
        remote.update(&name("/c"), 1);

        local.merge(&remote);
        assert_eq!(local.get_seq_no(&name("/a")), Some(5));
        assert_eq!(local.get_seq_no(&name("/b")), Some(4));
        assert_eq!(local.get_seq_no(&name("/c")), Some(1));
    }

    #[test]
    fn test_merge_idempotent() {
        let mut other = State::new();
        other.update(&name("/a"), 2);
        other.update(&name("/b"), 7);

        let mut once = State::new();
        once.update(&name("/a"), 5);
        once += &other;
        let mut twice = once.clone();
        twice += &other;

        assert_eq!(once, twice);
        assert_eq!(once.get_digest(), twice.get_digest());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut state = State::new();
        state.update(&name("/node/a"), 10);
        state.update(&name("/node/b"), 20);

        let decoded = State::decode(&state.encode()).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(decoded.get_digest(), state.get_digest());
    }

    #[test]
    fn test_reset() {
        let mut state = State::new();
        state.update(&name("/a"), 1);
        state.reset();
        assert!(state.is_empty());
        assert_eq!(state.get_digest(), Sha256Digest::EMPTY);
    }
}
