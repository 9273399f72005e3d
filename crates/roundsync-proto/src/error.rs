//! Error types for the roundsync protocol layer.

use thiserror::Error;

use roundsync_core::CoreError;

/// Errors from decoding protocol payloads and packets.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The top-level TLV type is not a known payload variant.
    #[error("unknown payload type tag {0}")]
    UnknownPayloadType(u64),

    /// A decoded payload violates the variant's field requirements.
    #[error("malformed payload: {0}")]
    MalformedPayload(&'static str),

    /// A packet is structurally invalid.
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    /// A TLV-level or cryptographic failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
