//! Payload codecs: [`DataContent`] and [`RecoData`].
//!
//! `DataContent` is the body of every reply to a data interest and comes in
//! three tagged variants; `RecoData` is the body of a recovery reply. Both
//! decode defensively: unknown top-level tags and variant/field mismatches
//! are errors the caller drops.

use roundsync_core::tlv::{self, types, TlvReader, TlvWriter};
use roundsync_core::{Name, Sha256Digest, State};

use crate::diff::RoundNo;
use crate::error::{ProtoError, Result};

/// The three wire variants of [`DataContent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// Only a state diff.
    DataOnly,
    /// Only a cumulative-digest announcement.
    CumulativeOnly,
    /// A state diff plus a cumulative-digest announcement.
    DataAndCumulative,
}

impl ContentType {
    /// The TLV type tag of this variant.
    pub fn tag(self) -> u64 {
        match self {
            ContentType::DataOnly => types::DATA_ONLY,
            ContentType::CumulativeOnly => types::CUMULATIVE_ONLY,
            ContentType::DataAndCumulative => types::DATA_AND_CUMULATIVE,
        }
    }
}

/// Body of a reply to a data interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataContent {
    user_prefix: Name,
    round_no: RoundNo,
    cumulative_digest: Option<Sha256Digest>,
    state: Option<State>,
}

impl DataContent {
    /// Assemble a payload. The variant follows from which parts are
    /// present; use [`DataContent::well_formed`] before encoding.
    pub fn new(
        user_prefix: Name,
        round_no: RoundNo,
        cumulative_digest: Option<Sha256Digest>,
        state: Option<State>,
    ) -> Self {
        Self {
            user_prefix,
            round_no,
            cumulative_digest,
            state,
        }
    }

    /// The wire variant this payload encodes to.
    pub fn data_type(&self) -> ContentType {
        match (&self.cumulative_digest, &self.state) {
            (Some(_), Some(_)) => ContentType::DataAndCumulative,
            (Some(_), None) => ContentType::CumulativeOnly,
            _ => ContentType::DataOnly,
        }
    }

    /// The producer session the cumulative announcement came from.
    pub fn user_prefix(&self) -> &Name {
        &self.user_prefix
    }

    /// The round the cumulative digest covers (0 when none is carried).
    pub fn round_no(&self) -> RoundNo {
        self.round_no
    }

    /// The announced cumulative digest, if any.
    pub fn cumulative_digest(&self) -> Option<Sha256Digest> {
        self.cumulative_digest
    }

    /// The carried state diff, if any.
    pub fn state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    /// Variant invariant: a cumulative announcement names its producer, and
    /// a payload without one is a plain diff at round 0.
    pub fn well_formed(&self) -> bool {
        (!self.user_prefix.is_empty() && self.cumulative_digest.is_some())
            || (self.round_no == 0 && self.cumulative_digest.is_none() && self.state.is_some())
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = TlvWriter::new();
        if let Some(digest) = &self.cumulative_digest {
            let mut info = TlvWriter::new();
            self.user_prefix.encode_into(&mut info);
            info.write_nonneg_block(types::ROUND_NO, self.round_no);
            info.write_block(types::GENERIC_COMPONENT, digest.as_ref());
            body.write_block(types::CUMULATIVE_INFO, info.bytes());
        }
        if let Some(state) = &self.state {
            state.encode_into(&mut body);
        }

        let mut writer = TlvWriter::new();
        writer.write_block(self.data_type().tag(), body.bytes());
        writer.into_bytes()
    }

    /// Decode from wire bytes, rejecting unknown tags and payloads whose
    /// fields do not match their variant.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = TlvReader::new(bytes);
        let (tag, body) = reader.read_element().map_err(ProtoError::Core)?;
        let data_type = match tag {
            types::DATA_ONLY => ContentType::DataOnly,
            types::CUMULATIVE_ONLY => ContentType::CumulativeOnly,
            types::DATA_AND_CUMULATIVE => ContentType::DataAndCumulative,
            other => return Err(ProtoError::UnknownPayloadType(other)),
        };

        let mut body = TlvReader::new(body);
        let mut user_prefix = Name::new();
        let mut round_no = 0;
        let mut cumulative_digest = None;
        if !body.is_empty() && body.peek_type()? == types::CUMULATIVE_INFO {
            let info = body.expect_element(types::CUMULATIVE_INFO)?;
            let mut info = TlvReader::new(info);
            user_prefix = Name::decode_from(&mut info)?;
            round_no = tlv::read_nonneg(info.expect_element(types::ROUND_NO)?)?;
            let digest = info.expect_element(types::GENERIC_COMPONENT)?;
            cumulative_digest = Some(Sha256Digest::try_from(digest)?);
        }

        let mut state = None;
        if !body.is_empty() && body.peek_type()? == types::STATE {
            state = Some(State::decode_from(&mut body)?);
        }

        let matches_variant = match data_type {
            ContentType::DataOnly => cumulative_digest.is_none() && state.is_some(),
            ContentType::CumulativeOnly => cumulative_digest.is_some() && state.is_none(),
            ContentType::DataAndCumulative => cumulative_digest.is_some() && state.is_some(),
        };
        if !matches_variant {
            return Err(ProtoError::MalformedPayload(
                "payload fields do not match the variant tag",
            ));
        }

        Ok(Self {
            user_prefix,
            round_no,
            cumulative_digest,
            state,
        })
    }
}

/// Body of a reply to a recovery interest: a full state snapshot as of a
/// round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoData {
    round_no: RoundNo,
    state: State,
}

impl RecoData {
    /// Assemble a snapshot payload.
    pub fn new(round_no: RoundNo, state: State) -> Self {
        Self { round_no, state }
    }

    /// The round the snapshot is current as of.
    pub fn round_no(&self) -> RoundNo {
        self.round_no
    }

    /// The snapshot.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = TlvWriter::new();
        body.write_nonneg_block(types::ROUND_NO, self.round_no);
        self.state.encode_into(&mut body);

        let mut writer = TlvWriter::new();
        writer.write_block(types::RECOVERY_DATA, body.bytes());
        writer.into_bytes()
    }

    /// Decode from wire bytes, rejecting anything but a recovery payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = TlvReader::new(bytes);
        let (tag, body) = reader.read_element().map_err(ProtoError::Core)?;
        if tag != types::RECOVERY_DATA {
            return Err(ProtoError::UnknownPayloadType(tag));
        }
        let mut body = TlvReader::new(body);
        let round_no = tlv::read_nonneg(body.expect_element(types::ROUND_NO)?)?;
        let state = State::decode_from(&mut body)?;
        Ok(Self { round_no, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> State {
        let mut state = State::new();
        state.update(&Name::from_uri("/node/a"), 3);
        state.update(&Name::from_uri("/node/b"), 8);
        state
    }

    #[test]
    fn test_data_only_roundtrip() {
        let content = DataContent::new(Name::new(), 0, None, Some(sample_state()));
        assert!(content.well_formed());
        assert_eq!(content.data_type(), ContentType::DataOnly);

        let decoded = DataContent::decode(&content.encode()).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn test_cumulative_only_roundtrip() {
        let content = DataContent::new(
            Name::from_uri("/node/a").append_number(12345),
            9,
            Some(Sha256Digest::hash(b"cumulative")),
            None,
        );
        assert!(content.well_formed());
        assert_eq!(content.data_type(), ContentType::CumulativeOnly);

        let decoded = DataContent::decode(&content.encode()).unwrap();
        assert_eq!(decoded, content);
        assert_eq!(decoded.round_no(), 9);
    }

    #[test]
    fn test_data_and_cumulative_roundtrip() {
        let content = DataContent::new(
            Name::from_uri("/node/a"),
            4,
            Some(Sha256Digest::hash(b"cd")),
            Some(sample_state()),
        );
        assert!(content.well_formed());
        assert_eq!(content.data_type(), ContentType::DataAndCumulative);

        let decoded = DataContent::decode(&content.encode()).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn test_well_formedness() {
        // Neither part present.
        assert!(!DataContent::new(Name::new(), 0, None, None).well_formed());
        // Digest without a producer prefix.
        assert!(
            !DataContent::new(Name::new(), 1, Some(Sha256Digest::EMPTY), None).well_formed()
        );
        // Plain diff with a nonzero round claim.
        assert!(!DataContent::new(Name::new(), 1, None, Some(State::new())).well_formed());
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let mut writer = TlvWriter::new();
        writer.write_block(200, b"whatever");
        assert!(matches!(
            DataContent::decode(&writer.into_bytes()),
            Err(ProtoError::UnknownPayloadType(200))
        ));
    }

    #[test]
    fn test_decode_rejects_variant_mismatch() {
        // A DataOnly body under a CumulativeOnly tag.
        let inner = DataContent::new(Name::new(), 0, None, Some(sample_state()));
        let mut bytes = inner.encode();
        bytes[0] = types::CUMULATIVE_ONLY as u8;
        assert!(DataContent::decode(&bytes).is_err());
    }

    #[test]
    fn test_reco_data_roundtrip() {
        let reco = RecoData::new(17, sample_state());
        let decoded = RecoData::decode(&reco.encode()).unwrap();
        assert_eq!(decoded, reco);
    }

    #[test]
    fn test_reco_data_rejects_data_content() {
        let content = DataContent::new(Name::new(), 0, None, Some(sample_state()));
        assert!(RecoData::decode(&content.encode()).is_err());
        let reco = RecoData::new(1, State::new());
        assert!(DataContent::decode(&reco.encode()).is_err());
    }
}
