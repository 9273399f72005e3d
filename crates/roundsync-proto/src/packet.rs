//! Signed data packets.
//!
//! Every reply travels as a [`DataPacket`]: a name, a freshness period, the
//! opaque payload, and an Ed25519 signature by the producer. The SHA-256 of
//! the encoded packet is its implicit digest; appended to the name it forms
//! the full name, whose last component is what exclude filters match on.

use bytes::Bytes;
use std::fmt;
use std::time::Duration;

use roundsync_core::tlv::{self, types, TlvReader, TlvWriter};
use roundsync_core::{
    CoreError, Ed25519PublicKey, Ed25519Signature, Name, NameComponent, Sha256Digest, Signer,
};

use crate::error::{ProtoError, Result};

/// A signed, named response blob.
#[derive(Clone, PartialEq, Eq)]
pub struct DataPacket {
    name: Name,
    freshness: Duration,
    content: Bytes,
    key: Ed25519PublicKey,
    signature: Ed25519Signature,
}

impl DataPacket {
    /// Build and sign a packet.
    pub fn sign(name: Name, freshness: Duration, content: Bytes, signer: &dyn Signer) -> Self {
        let key = signer.public_key();
        let signable = Self::signable_bytes(&name, freshness, &content, &key);
        let signature = signer.sign(&signable);
        Self {
            name,
            freshness,
            content,
            key,
            signature,
        }
    }

    fn signable_bytes(
        name: &Name,
        freshness: Duration,
        content: &[u8],
        key: &Ed25519PublicKey,
    ) -> Vec<u8> {
        let mut writer = TlvWriter::new();
        name.encode_into(&mut writer);
        writer.write_nonneg_block(types::FRESHNESS_PERIOD, freshness.as_millis() as u64);
        writer.write_block(types::CONTENT, content);
        writer.write_block(types::SIGNATURE_INFO, key.as_bytes());
        writer.into_bytes()
    }

    /// The packet name (the interest name it answers).
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// How long caches may serve this packet as fresh.
    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// The opaque payload.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// The producer's signing key.
    pub fn key(&self) -> &Ed25519PublicKey {
        &self.key
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = TlvWriter::new();
        self.name.encode_into(&mut body);
        body.write_nonneg_block(types::FRESHNESS_PERIOD, self.freshness.as_millis() as u64);
        body.write_block(types::CONTENT, &self.content);
        body.write_block(types::SIGNATURE_INFO, self.key.as_bytes());
        body.write_block(types::SIGNATURE_VALUE, self.signature.as_bytes());

        let mut writer = TlvWriter::new();
        writer.write_block(types::DATA, body.bytes());
        writer.into_bytes()
    }

    /// Decode from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = TlvReader::new(bytes);
        let body = reader.expect_element(types::DATA).map_err(ProtoError::Core)?;
        let mut body = TlvReader::new(body);

        let name = Name::decode_from(&mut body)?;
        let freshness = tlv::read_nonneg(body.expect_element(types::FRESHNESS_PERIOD)?)?;
        let content = body.expect_element(types::CONTENT)?.to_vec();
        let key = body.expect_element(types::SIGNATURE_INFO)?;
        let key: [u8; 32] = key
            .try_into()
            .map_err(|_| ProtoError::MalformedPacket("signing key must be 32 bytes"))?;
        let sig = body.expect_element(types::SIGNATURE_VALUE)?;
        let sig: [u8; 64] = sig
            .try_into()
            .map_err(|_| ProtoError::MalformedPacket("signature must be 64 bytes"))?;

        Ok(Self {
            name,
            freshness: Duration::from_millis(freshness),
            content: content.into(),
            key: Ed25519PublicKey::from_bytes(key),
            signature: Ed25519Signature::from_bytes(sig),
        })
    }

    /// Check the packet's signature against its embedded key.
    pub fn verify_signature(&self) -> std::result::Result<(), CoreError> {
        let signable = Self::signable_bytes(&self.name, self.freshness, &self.content, &self.key);
        self.key.verify(&signable, &self.signature)
    }

    /// SHA-256 of the encoded packet, as a name component.
    pub fn implicit_digest(&self) -> NameComponent {
        let digest = Sha256Digest::hash(&self.encode());
        NameComponent::from_bytes(digest.as_bytes().to_vec())
    }

    /// The packet name extended with the implicit digest.
    pub fn full_name(&self) -> Name {
        self.name.clone().append(self.implicit_digest())
    }
}

impl fmt::Debug for DataPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPacket")
            .field("name", &self.name)
            .field("content_len", &self.content.len())
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Validation policy for incoming packets.
pub trait PacketVerifier {
    /// Accept or reject a packet. Rejected packets are dropped silently.
    fn verify(&self, packet: &DataPacket) -> std::result::Result<(), CoreError>;
}

/// Accepts every packet. Validation policy is the host's concern; this is
/// the default when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllVerifier;

impl PacketVerifier for AcceptAllVerifier {
    fn verify(&self, _packet: &DataPacket) -> std::result::Result<(), CoreError> {
        Ok(())
    }
}

/// Checks each packet's signature against its embedded key. Does not decide
/// whether the key itself is trusted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureVerifier;

impl PacketVerifier for SignatureVerifier {
    fn verify(&self, packet: &DataPacket) -> std::result::Result<(), CoreError> {
        packet.verify_signature()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundsync_core::Keypair;

    fn sample_packet() -> DataPacket {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        DataPacket::sign(
            Name::from_uri("/sync/DATA").append_number(3),
            Duration::from_millis(1000),
            Bytes::from_static(b"payload"),
            &keypair,
        )
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let packet = sample_packet();
        let decoded = DataPacket::decode(&packet.encode()).unwrap();
        assert_eq!(decoded, packet);
        decoded.verify_signature().unwrap();
    }

    #[test]
    fn test_tampered_content_fails_verification() {
        let packet = sample_packet();
        let mut bytes = packet.encode();
        let len = bytes.len();
        bytes[len - 70] ^= 0x01;
        // Either the structure breaks or the signature does.
        if let Ok(decoded) = DataPacket::decode(&bytes) {
            assert!(decoded.verify_signature().is_err());
        }
    }

    #[test]
    fn test_full_name_extends_packet_name() {
        let packet = sample_packet();
        let full = packet.full_name();
        assert_eq!(full.len(), packet.name().len() + 1);
        assert!(full.starts_with(packet.name()));
        assert_eq!(full.get(-1).unwrap().len(), 32);
    }

    #[test]
    fn test_implicit_digest_is_stable() {
        let packet = sample_packet();
        assert_eq!(packet.implicit_digest(), packet.implicit_digest());
    }

    #[test]
    fn test_signature_verifier_rejects_wrong_key() {
        let packet = sample_packet();
        SignatureVerifier.verify(&packet).unwrap();

        // Re-encode with a swapped key: decode, patch, check.
        let other = Keypair::from_seed(&[0x43; 32]);
        let forged = DataPacket {
            key: other.public_key(),
            ..packet
        };
        assert!(SignatureVerifier.verify(&forged).is_err());
        AcceptAllVerifier.verify(&forged).unwrap();
    }
}
