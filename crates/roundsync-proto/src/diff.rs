//! Per-round differential state.

use std::collections::BTreeSet;
use std::fmt;

use roundsync_core::{DigestBuilder, Name, NameComponent, SeqNo, Sha256Digest, State, UpdateResult};

use crate::config::CUMULATIVE_ONLY_SEQ;
use crate::event::EventId;

/// Round number: labels one batch of production across the group.
pub type RoundNo = u64;

/// Response-name suffixes already seen for a round.
///
/// Attached to re-issued data interests so the substrate's caches return
/// something the node has not received yet.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ExcludeFilter {
    components: BTreeSet<NameComponent>,
}

impl ExcludeFilter {
    /// Empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a seen suffix.
    pub fn insert(&mut self, component: NameComponent) {
        self.components.insert(component);
    }

    /// True when `component` has been recorded.
    pub fn contains(&self, component: &NameComponent) -> bool {
        self.components.contains(component)
    }

    /// Number of recorded suffixes.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True when nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Debug for ExcludeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExcludeFilter({} entries)", self.components.len())
    }
}

/// A cumulative digest together with the round it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CumulativeInfo {
    /// The round the digest covers.
    pub round: RoundNo,
    /// The cumulative digest at that round.
    pub digest: Sha256Digest,
}

/// One round's delta over the aggregate state, plus the round's digests
/// and fetch bookkeeping.
#[derive(Clone, Default)]
pub struct DiffState {
    state: State,
    round: RoundNo,
    round_digest: Option<Sha256Digest>,
    cumulative_digest: Option<Sha256Digest>,
    cumulative_info: Option<CumulativeInfo>,
    exclude: ExcludeFilter,
    sync_timer: Option<EventId>,
}

impl DiffState {
    /// Create an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// The leaves this round contributed.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Insert or advance a leaf in this diff.
    pub fn update(&mut self, session_name: &Name, seq_no: SeqNo) -> UpdateResult {
        self.state.update(session_name, seq_no)
    }

    /// The round this diff belongs to.
    pub fn round(&self) -> RoundNo {
        self.round
    }

    /// Assign the round number.
    pub fn set_round(&mut self, round: RoundNo) {
        self.round = round;
    }

    /// Recompute the round digest from the current leaves. An empty diff
    /// digests to the canonical empty-state digest.
    pub fn update_round_digest(&mut self) {
        self.round_digest = Some(self.state.get_digest());
    }

    /// The frozen round digest, once computed.
    pub fn round_digest(&self) -> Option<Sha256Digest> {
        self.round_digest
    }

    /// Chain the cumulative digest:
    /// `SHA-256(previous_cumulative ‖ round_digest)`.
    pub fn update_cumulative_digest(&mut self, previous_cumulative: &Sha256Digest) {
        let round_digest = self
            .round_digest
            .unwrap_or_else(|| self.state.get_digest());
        let mut builder = DigestBuilder::new();
        builder.update(previous_cumulative.as_ref());
        builder.update(round_digest.as_ref());
        self.cumulative_digest = Some(builder.finish());
    }

    /// Overwrite the cumulative digest (stabilization assigns the digest of
    /// the folded stable state).
    pub fn set_cumulative_digest(&mut self, digest: Option<Sha256Digest>) {
        self.cumulative_digest = digest;
    }

    /// The cumulative digest committed for this round, if stabilized.
    pub fn cumulative_digest(&self) -> Option<Sha256Digest> {
        self.cumulative_digest
    }

    /// The older cumulative digest this diff is about, when it records a
    /// cumulative(-carrying) emission.
    pub fn cumulative_info(&self) -> Option<CumulativeInfo> {
        self.cumulative_info
    }

    /// Attach cumulative info.
    pub fn set_cumulative_info(&mut self, info: Option<CumulativeInfo>) {
        self.cumulative_info = info;
    }

    /// Seen-response filter for this round.
    pub fn exclude(&self) -> &ExcludeFilter {
        &self.exclude
    }

    /// Mutable access to the seen-response filter.
    pub fn exclude_mut(&mut self) -> &mut ExcludeFilter {
        &mut self.exclude
    }

    /// Replace the outstanding sync-interest re-expression timer, returning
    /// the previous one so the caller can cancel it.
    pub fn replace_sync_timer(&mut self, timer: EventId) -> Option<EventId> {
        self.sync_timer.replace(timer)
    }

    /// The outstanding sync-interest re-expression timer, if any.
    pub fn sync_timer(&self) -> Option<EventId> {
        self.sync_timer
    }

    /// The portion of this round produced by `prefix`, if any: a
    /// single-leaf diff carrying this round's number and cumulative digest.
    /// The flag is true when that portion is a cumulative-only record
    /// (sentinel seq-no), in which case the cumulative info is copied too.
    pub fn get_state_from(&self, prefix: &Name) -> Option<(DiffState, bool)> {
        let leaf = self.state.get(prefix)?;
        let mut result = DiffState::new();
        result.update(prefix, leaf.seq_no());
        result.round = self.round;
        result.cumulative_digest = self.cumulative_digest;
        let cumulative_only = leaf.seq_no() == CUMULATIVE_ONLY_SEQ;
        if cumulative_only {
            result.cumulative_info = self.cumulative_info;
        }
        Some((result, cumulative_only))
    }
}

impl fmt::Debug for DiffState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffState")
            .field("round", &self.round)
            .field("state", &self.state)
            .field("round_digest", &self.round_digest)
            .field("cumulative_digest", &self.cumulative_digest)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundsync_core::Sha256Digest;

    fn name(uri: &str) -> Name {
        Name::from_uri(uri)
    }

    #[test]
    fn test_empty_round_digest_is_empty_state_digest() {
        let mut diff = DiffState::new();
        diff.update_round_digest();
        assert_eq!(diff.round_digest(), Some(Sha256Digest::EMPTY));
    }

    #[test]
    fn test_cumulative_chain_is_deterministic() {
        let prev = Sha256Digest::hash(b"previous");

        let mut a = DiffState::new();
        a.update(&name("/n/1"), 4);
        a.update_round_digest();
        a.update_cumulative_digest(&prev);

        let mut b = DiffState::new();
        b.update(&name("/n/1"), 4);
        b.update_round_digest();
        b.update_cumulative_digest(&prev);

        assert_eq!(a.cumulative_digest(), b.cumulative_digest());

        let mut c = DiffState::new();
        c.update(&name("/n/1"), 5);
        c.update_round_digest();
        c.update_cumulative_digest(&prev);
        assert_ne!(a.cumulative_digest(), c.cumulative_digest());
    }

    #[test]
    fn test_get_state_from_data_producer() {
        let mut diff = DiffState::new();
        diff.set_round(7);
        diff.update(&name("/n/a"), 3);
        diff.update(&name("/n/b"), 9);
        diff.set_cumulative_digest(Some(Sha256Digest::hash(b"cd")));

        let (portion, cumulative_only) = diff.get_state_from(&name("/n/a")).unwrap();
        assert!(!cumulative_only);
        assert_eq!(portion.round(), 7);
        assert_eq!(portion.state().len(), 1);
        assert_eq!(portion.state().get_seq_no(&name("/n/a")), Some(3));
        assert_eq!(portion.cumulative_digest(), diff.cumulative_digest());

        assert!(diff.get_state_from(&name("/n/c")).is_none());
    }

    #[test]
    fn test_get_state_from_cumulative_only_record() {
        let info = CumulativeInfo {
            round: 4,
            digest: Sha256Digest::hash(b"cumulative"),
        };
        let mut diff = DiffState::new();
        diff.update(&name("/n/a"), CUMULATIVE_ONLY_SEQ);
        diff.set_cumulative_info(Some(info));

        let (portion, cumulative_only) = diff.get_state_from(&name("/n/a")).unwrap();
        assert!(cumulative_only);
        assert_eq!(portion.cumulative_info(), Some(info));
    }

    #[test]
    fn test_exclude_filter() {
        let mut filter = ExcludeFilter::new();
        let component = NameComponent::from_bytes(vec![1, 2, 3]);
        assert!(!filter.contains(&component));
        filter.insert(component.clone());
        filter.insert(component.clone());
        assert!(filter.contains(&component));
        assert_eq!(filter.len(), 1);
    }
}
