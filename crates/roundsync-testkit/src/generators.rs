//! Proptest generators for property-based testing.

use proptest::prelude::*;

use roundsync_core::{Name, NameComponent, Sha256Digest, State};
use roundsync_proto::{DataContent, RecoData, RoundNo};

/// Generate a non-empty name component.
pub fn name_component() -> impl Strategy<Value = NameComponent> {
    prop::collection::vec(any::<u8>(), 1..=8).prop_map(NameComponent::from_bytes)
}

/// Generate a name with 1 to 4 components.
pub fn name() -> impl Strategy<Value = Name> {
    prop::collection::vec(name_component(), 1..=4).prop_map(Name::from_components)
}

/// Generate a random digest.
pub fn digest() -> impl Strategy<Value = Sha256Digest> {
    any::<[u8; 32]>().prop_map(Sha256Digest::from_bytes)
}

/// Generate a valid (non-sentinel) sequence number.
pub fn seq() -> impl Strategy<Value = u64> {
    1u64..=1_000_000
}

/// Generate a round number.
pub fn round() -> impl Strategy<Value = RoundNo> {
    1u64..=1_000_000
}

/// Generate a state holding up to `max_leaves` sessions.
pub fn state(max_leaves: usize) -> impl Strategy<Value = State> {
    prop::collection::btree_map(name(), seq(), 0..=max_leaves).prop_map(|leaves| {
        let mut state = State::new();
        for (session, seq_no) in leaves {
            state.update(&session, seq_no);
        }
        state
    })
}

/// Generate a well-formed [`DataContent`] of any variant.
pub fn data_content() -> impl Strategy<Value = DataContent> {
    prop_oneof![
        // DataOnly: a plain diff at round 0.
        state(5).prop_map(|s| DataContent::new(Name::new(), 0, None, Some(s))),
        // CumulativeOnly: a digest announcement from a named producer.
        (name(), round(), digest())
            .prop_map(|(prefix, r, d)| DataContent::new(prefix, r, Some(d), None)),
        // DataAndCumulative: both.
        (name(), round(), digest(), state(5))
            .prop_map(|(prefix, r, d, s)| DataContent::new(prefix, r, Some(d), Some(s))),
    ]
}

/// Generate a [`RecoData`] snapshot.
pub fn reco_data() -> impl Strategy<Value = RecoData> {
    (round(), state(8)).prop_map(|(r, s)| RecoData::new(r, s))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_generated_content_is_well_formed(content in data_content()) {
            prop_assert!(content.well_formed());
        }

        #[test]
        fn test_generated_states_digest_deterministically(s in state(6)) {
            let reencoded = State::decode(&s.encode()).unwrap();
            prop_assert_eq!(reencoded.get_digest(), s.get_digest());
        }
    }
}
