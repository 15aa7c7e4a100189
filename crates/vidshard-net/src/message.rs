//! Protocol messages for the vidshard network layer.
//!
//! Every call is one [`Request`] frame answered by one [`Response`] frame
//! on the same TCP connection.

use serde::{Deserialize, Serialize};

/// Requests understood by storage nodes and the router.
///
/// Storage nodes serve the content operations. The router serves the admin
/// operations and forwards content operations to the owning node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Store a file, creating its video directory on demand.
    WriteFile {
        /// Video the file belongs to.
        video_id: String,
        /// File name within the video.
        filename: String,
        /// File contents.
        data: Vec<u8>,
    },

    /// Fetch a stored file.
    ReadFile {
        /// Video the file belongs to.
        video_id: String,
        /// File name within the video.
        filename: String,
    },

    /// Remove a stored file.
    DeleteFile {
        /// Video the file belongs to.
        video_id: String,
        /// File name within the video.
        filename: String,
    },

    /// List the storage nodes registered with the router.
    ListNodes,

    /// Register a storage node and migrate the keys it now owns.
    AddNode {
        /// `host:port` of the node to add.
        node_address: String,
    },

    /// Deregister a storage node and migrate its keys away.
    RemoveNode {
        /// `host:port` of the node to remove.
        node_address: String,
    },

    /// Reachability check.
    Ping,
}

/// Responses to [`Request`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Answer to [`Request::WriteFile`].
    WriteFile {
        /// Whether the write was persisted.
        success: bool,
    },

    /// Answer to [`Request::ReadFile`].
    ReadFile {
        /// The stored bytes.
        data: Vec<u8>,
    },

    /// Answer to [`Request::DeleteFile`].
    DeleteFile {
        /// Whether the file was removed.
        success: bool,
    },

    /// Answer to [`Request::ListNodes`].
    ListNodes {
        /// Node addresses in registration order.
        nodes: Vec<String>,
    },

    /// Answer to [`Request::AddNode`].
    AddNode(MigrationSummary),

    /// Answer to [`Request::RemoveNode`].
    RemoveNode(MigrationSummary),

    /// Answer to [`Request::Ping`].
    Pong,

    /// The request failed.
    Error {
        /// Error category.
        kind: ErrorKind,
        /// Human-readable description.
        message: String,
    },
}

impl Response {
    /// Shorthand for an error response.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of a membership change as reported over the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSummary {
    /// Keys successfully written to their new owner.
    pub migrated_file_count: i32,
    /// Keys whose relocation failed; they remain at the old owner.
    pub failed_file_count: i32,
    /// Keys copied to the new owner whose old copy could not be deleted.
    pub orphaned_file_count: i32,
}

/// Error categories carried in [`Response::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The addressed content does not exist.
    NotFound,
    /// The request was malformed (bad key, bad address).
    InvalidArgument,
    /// The node is already registered.
    AlreadyExists,
    /// The request is valid but cannot be applied in the current state.
    FailedPrecondition,
    /// A downstream node could not be reached.
    Unavailable,
    /// The receiver does not serve this kind of request.
    Unimplemented,
    /// Any other failure.
    Internal,
}
