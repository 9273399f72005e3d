//! Golden wire vectors.
//!
//! Every implementation of the protocol must produce these exact bytes:
//! the digest chain is computed over encodings, so a single divergent byte
//! desynchronizes a node from the group.

use roundsync::{DataContent, Name, RecoData, Sha256Digest, State};

fn state_a1() -> State {
    let mut state = State::new();
    state.update(&Name::from_uri("/a"), 1);
    state
}

#[test]
fn test_name_encoding_vector() {
    let name = Name::from_uri("/sync/DATA").append_number(300);
    assert_eq!(
        hex::encode(name.encode()),
        "0710080473796e630804444154410802012c"
    );
    assert_eq!(Name::decode(&name.encode()).unwrap(), name);
}

#[test]
fn test_state_encoding_vector() {
    assert_eq!(
        hex::encode(state_a1().encode()),
        "860a83080703080161840101"
    );
}

#[test]
fn test_state_digest_vectors() {
    // SHA-256 of the single leaf digest, which is the SHA-256 of the
    // encoded (name, seq-no) pair.
    assert_eq!(
        state_a1().get_digest().to_hex(),
        "b2b5e2a24b608c5c8c0fc567b6aa53a9c1beca03bbdb50a6e8158450f5e1a957"
    );
    assert_eq!(
        State::new().get_digest().to_hex(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn test_data_only_vector() {
    let content = DataContent::new(Name::new(), 0, None, Some(state_a1()));
    assert_eq!(
        hex::encode(content.encode()),
        "800c860a83080703080161840101"
    );
    assert_eq!(DataContent::decode(&content.encode()).unwrap(), content);
}

#[test]
fn test_cumulative_only_vector() {
    let content = DataContent::new(Name::from_uri("/a"), 1, Some(Sha256Digest::EMPTY), None);
    assert_eq!(
        hex::encode(content.encode()),
        "812c872a07030801618501010820\
         e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(DataContent::decode(&content.encode()).unwrap(), content);
}

#[test]
fn test_recovery_data_vector() {
    let reco = RecoData::new(2, state_a1());
    assert_eq!(
        hex::encode(reco.encode()),
        "880f850102860a83080703080161840101"
    );
    assert_eq!(RecoData::decode(&reco.encode()).unwrap(), reco);
}
