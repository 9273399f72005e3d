//! # roundsync core
//!
//! Pure primitives for the roundsync protocol: hierarchical names,
//! deterministic TLV framing, SHA-256 digests, Ed25519 signing, and the
//! aggregate sync state.
//!
//! This crate contains no I/O and no protocol logic. It is pure computation
//! over the data structures every other roundsync crate shares.
//!
//! ## Key Types
//!
//! - [`Name`] - hierarchical octet-component name, the addressing primitive
//! - [`State`] - session name → latest seq-no, with a canonical root digest
//! - [`Sha256Digest`] - the only hash primitive in the protocol
//! - [`Keypair`] / [`Signer`] - packet signing identity

pub mod crypto;
pub mod error;
pub mod leaf;
pub mod name;
pub mod state;
pub mod tlv;

pub use crypto::{
    DigestBuilder, Ed25519PublicKey, Ed25519Signature, Keypair, Sha256Digest, Signer,
};
pub use error::CoreError;
pub use leaf::{Leaf, SeqNo};
pub use name::{Name, NameComponent};
pub use state::{State, UpdateResult};
