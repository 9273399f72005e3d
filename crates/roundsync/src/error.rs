//! Error types for the node driver.

use thiserror::Error;

/// Errors from running a sync node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The transport failed or closed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport's event stream ended.
    #[error("transport closed")]
    FaceClosed,

    /// The node's command channel closed (the node shut down).
    #[error("node is not running")]
    NotRunning,
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
