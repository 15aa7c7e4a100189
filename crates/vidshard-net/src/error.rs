//! Error types for network operations.

use std::time::Duration;

use vidshard_types::NodeAddr;

use crate::message::ErrorKind;

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to establish a connection to a node.
    #[error("failed to connect to {addr}: {reason}")]
    Connect {
        /// The node we tried to reach.
        addr: NodeAddr,
        /// Why the dial failed.
        reason: String,
    },

    /// The call did not complete within the configured timeout.
    #[error("request to {addr} timed out after {}ms", after.as_millis())]
    Timeout {
        /// The node that did not answer in time.
        addr: NodeAddr,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// A socket-level I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A frame exceeded the maximum allowed size.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// Announced frame length.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// The peer closed the connection before sending a response.
    #[error("connection closed by peer")]
    Closed,

    /// The remote node does not have the requested content.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote node rejected the request.
    #[error("remote error ({kind:?}): {message}")]
    Remote {
        /// Error category reported by the remote.
        kind: ErrorKind,
        /// Human-readable description.
        message: String,
    },

    /// The remote answered with a response that does not match the request.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl NetError {
    /// Whether this error means "the content does not exist there".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
