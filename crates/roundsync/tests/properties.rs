//! Protocol-level properties, checked over generated inputs.

use proptest::prelude::*;

use roundsync::{DataContent, Name, RecoData, State};
use roundsync_testkit::generators;

proptest! {
    // Seq-nos observed through a State never decrease, whatever update
    // sequence is applied.
    #[test]
    fn prop_seq_nos_are_monotonic(
        ops in prop::collection::vec((0usize..4, 1u64..1000), 1..50)
    ) {
        let sessions: Vec<Name> = (0..4)
            .map(|i| Name::from_uri(&format!("/node/{i}")))
            .collect();
        let mut state = State::new();
        let mut observed = [0u64; 4];
        for (which, seq) in ops {
            state.update(&sessions[which], seq);
            let now = state.get_seq_no(&sessions[which]).unwrap_or(0);
            prop_assert!(now >= observed[which], "seq regressed");
            prop_assert!(now >= seq, "newer seq was not applied");
            observed[which] = now;
        }
    }

    // Two states holding the same mapping digest identically, regardless
    // of how they were built.
    #[test]
    fn prop_digest_is_content_addressed(state in generators::state(6)) {
        let mut rebuilt = State::new();
        let leaves: Vec<_> = state.leaves().collect();
        for leaf in leaves.iter().rev() {
            rebuilt.update(leaf.session_name(), leaf.seq_no());
        }
        prop_assert_eq!(rebuilt.get_digest(), state.get_digest());
        prop_assert_eq!(rebuilt.encode(), state.encode());
    }

    // Merging is idempotent: applying the same remote state twice changes
    // nothing after the first time.
    #[test]
    fn prop_merge_is_idempotent(
        base in generators::state(5),
        other in generators::state(5),
    ) {
        let mut once = base;
        once += &other;
        let mut twice = once.clone();
        twice += &other;
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.get_digest(), twice.get_digest());
    }

    // Merging never loses a session or regresses its seq-no.
    #[test]
    fn prop_merge_takes_maxima(
        base in generators::state(5),
        other in generators::state(5),
    ) {
        let mut merged = base.clone();
        merged += &other;
        for leaf in base.leaves().chain(other.leaves()) {
            let got = merged.get_seq_no(leaf.session_name());
            prop_assert!(got >= Some(leaf.seq_no()));
        }
    }

    #[test]
    fn prop_data_content_roundtrip(content in generators::data_content()) {
        let decoded = DataContent::decode(&content.encode()).unwrap();
        prop_assert_eq!(decoded, content);
    }

    #[test]
    fn prop_reco_data_roundtrip(reco in generators::reco_data()) {
        let decoded = RecoData::decode(&reco.encode()).unwrap();
        prop_assert_eq!(decoded, reco);
    }

    #[test]
    fn prop_name_roundtrip(name in generators::name()) {
        let decoded = Name::decode(&name.encode()).unwrap();
        prop_assert_eq!(decoded, name);
    }

    // A decoded state digests identically to the state it was encoded
    // from, which is what lets round digests be compared across nodes.
    #[test]
    fn prop_state_digest_survives_the_wire(state in generators::state(8)) {
        let decoded = State::decode(&state.encode()).unwrap();
        prop_assert_eq!(decoded.get_digest(), state.get_digest());
    }
}
