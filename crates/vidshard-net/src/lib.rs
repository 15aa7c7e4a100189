//! Network protocol over TCP.
//!
//! This crate implements vidshard's RPC layer:
//!
//! - [`Request`] / [`Response`]: the wire protocol (postcard-serialized,
//!   length-prefixed frames).
//! - [`RpcClient`]: pooled client connections with per-call timeouts.
//! - [`RpcServer`]: accept loop dispatching frames to a [`RequestHandler`].
//! - [`StorageClient`] / [`NodeConnector`]: the seams the router uses to
//!   talk to storage nodes, so tests can substitute in-memory nodes.

mod client;
mod error;
mod frame;
mod message;
mod server;

use std::sync::Arc;

use bytes::Bytes;
use vidshard_types::{ContentKey, NodeAddr};

pub use client::{ClientConfig, RpcClient, TcpConnector};
pub use error::NetError;
pub use frame::{MAX_FRAME_SIZE, read_frame, write_frame};
pub use message::{ErrorKind, MigrationSummary, Request, Response};
pub use server::{RequestHandler, RpcServer};

/// Content operations addressed to one storage node.
///
/// Implemented by [`RpcClient`] for real nodes; tests provide in-memory
/// implementations with failure injection.
#[async_trait::async_trait]
pub trait StorageClient: Send + Sync {
    /// The node this client talks to.
    fn addr(&self) -> &NodeAddr;

    /// Store `data` under `key`, overwriting any previous content.
    async fn write_file(&self, key: &ContentKey, data: Bytes) -> Result<(), NetError>;

    /// Fetch the content stored under `key`.
    ///
    /// Fails with [`NetError::NotFound`] if the node does not have it.
    async fn read_file(&self, key: &ContentKey) -> Result<Bytes, NetError>;

    /// Remove the content stored under `key`.
    ///
    /// Fails with [`NetError::NotFound`] if the node does not have it.
    async fn delete_file(&self, key: &ContentKey) -> Result<(), NetError>;
}

/// Dials storage nodes.
///
/// `connect` must fail if the node is unreachable; a returned client is
/// ready for use.
#[async_trait::async_trait]
pub trait NodeConnector: Send + Sync {
    /// Open a client for the node at `addr`.
    async fn connect(&self, addr: &NodeAddr) -> Result<Arc<dyn StorageClient>, NetError>;
}
