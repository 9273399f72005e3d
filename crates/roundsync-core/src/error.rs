//! Error types for roundsync core primitives.

use thiserror::Error;

/// Errors from TLV decoding and cryptographic primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unexpected end of input while decoding TLV")]
    UnexpectedEnd,

    #[error("TLV length {0} exceeds remaining input")]
    LengthOverrun(u64),

    #[error("unexpected TLV type: expected {expected}, got {got}")]
    UnexpectedType { expected: u64, got: u64 },

    #[error("reserved var-number prefix in TLV input")]
    ReservedVarNumber,

    #[error("non-negative integer has invalid width {0}")]
    BadIntegerWidth(usize),

    #[error("digest must be 32 bytes, got {0}")]
    BadDigestLength(usize),

    #[error("missing required field {0} while decoding")]
    MissingField(&'static str),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
