//! Error types for routing and membership operations.

use vidshard_net::{ErrorKind, NetError};
use vidshard_types::{ContentKey, KeyError, NodeAddr};

/// Errors that can occur while routing content or changing membership.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The owning node does not have the requested content.
    #[error("content not found: {0}")]
    NotFound(ContentKey),

    /// The owning node could not be reached or failed the request.
    #[error("network error: {0}")]
    Net(#[from] NetError),

    /// The node is already registered.
    #[error("node already registered: {0}")]
    DuplicateNode(NodeAddr),

    /// The node is not registered.
    #[error("node not registered: {0}")]
    UnknownNode(NodeAddr),

    /// A different node already occupies the new node's ring position.
    #[error("node {addr} hashes to the same ring point as {existing}")]
    HashCollision {
        /// The node being added.
        addr: NodeAddr,
        /// The registered node at that point.
        existing: NodeAddr,
    },

    /// Removing the node would leave stored keys without an owner.
    #[error("cannot remove {0}: it is the last node and keys are stored")]
    LastNode(NodeAddr),

    /// Membership kept changing under a write; it was not acknowledged.
    #[error("owner of {0} kept moving during write")]
    OwnerMoved(ContentKey),

    /// No storage nodes are registered.
    #[error("no storage nodes registered")]
    NoNodes,

    /// The request named an invalid key.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),
}

impl RouterError {
    /// Whether this error means "the content does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The wire error category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Net(NetError::Remote { kind, .. }) => *kind,
            Self::Net(_) | Self::NoNodes | Self::OwnerMoved(_) => ErrorKind::Unavailable,
            Self::DuplicateNode(_) | Self::HashCollision { .. } => ErrorKind::AlreadyExists,
            Self::UnknownNode(_) => ErrorKind::NotFound,
            Self::LastNode(_) => ErrorKind::FailedPrecondition,
            Self::InvalidKey(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Convert a storage node error for `key`, lifting "not found".
    pub(crate) fn from_net(key: &ContentKey, err: NetError) -> Self {
        if err.is_not_found() {
            Self::NotFound(key.clone())
        } else {
            Self::Net(err)
        }
    }
}
