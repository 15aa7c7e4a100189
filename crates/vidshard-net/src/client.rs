//! RPC client with connection pooling and per-call timeouts.
//!
//! [`RpcClient`] keeps a small pool of idle TCP connections to one node.
//! Each call takes a connection (or dials a new one), writes one request
//! frame, reads one response frame, and returns the connection to the pool.
//! Concurrent calls use separate connections, so a slow transfer never
//! blocks an unrelated request to the same node.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tracing::debug;
use vidshard_types::{ContentKey, NodeAddr};

use crate::error::NetError;
use crate::frame::{read_frame, write_frame};
use crate::message::{ErrorKind, MigrationSummary, Request, Response};
use crate::{NodeConnector, StorageClient};

/// Timeouts and pool sizing for [`RpcClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Upper bound on establishing a TCP connection.
    pub connect_timeout: Duration,
    /// Upper bound on one request/response exchange, dialing included.
    pub rpc_timeout: Duration,
    /// Idle connections kept per node.
    pub max_idle: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            rpc_timeout: Duration::from_secs(10),
            max_idle: 4,
        }
    }
}

/// Client for one vidshard node (storage node or router).
pub struct RpcClient {
    addr: NodeAddr,
    config: ClientConfig,
    /// Idle connections ready for reuse.
    ///
    /// A std `Mutex` is enough: it is only held to push or pop a stream,
    /// never across an await point.
    idle: Mutex<Vec<TcpStream>>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("addr", &self.addr)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Create a client without touching the network.
    ///
    /// The first call dials the node.
    pub fn new(addr: NodeAddr, config: ClientConfig) -> Self {
        Self {
            addr,
            config,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Create a client and verify the node answers a ping.
    pub async fn connect(addr: NodeAddr, config: ClientConfig) -> Result<Self, NetError> {
        let client = Self::new(addr, config);
        client.ping().await?;
        Ok(client)
    }

    /// The node this client talks to.
    pub fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    /// The client's timeouts and pool size.
    pub fn config(&self) -> ClientConfig {
        self.config
    }

    // -------------------------------------------------------------------
    // Request/response plumbing
    // -------------------------------------------------------------------

    /// Send one request and wait for its response, bounded by `rpc_timeout`.
    ///
    /// [`Response::Error`] is returned as-is; typed wrappers turn it into a
    /// [`NetError`].
    pub async fn call(&self, request: &Request) -> Result<Response, NetError> {
        let after = self.config.rpc_timeout;
        match tokio::time::timeout(after, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(NetError::Timeout {
                addr: self.addr.clone(),
                after,
            }),
        }
    }

    async fn exchange(&self, request: &Request) -> Result<Response, NetError> {
        if let Some(mut stream) = self.take_idle() {
            match write_frame(&mut stream, request).await {
                Ok(()) => return self.finish(stream).await,
                // The peer never received a whole frame, so it processed nothing.
                Err(NetError::Io(e)) => {
                    debug!(addr = %self.addr, error = %e, "pooled connection failed on send, redialing");
                }
                Err(e) => return Err(e),
            }
        }

        let mut stream = self.dial().await?;
        write_frame(&mut stream, request).await?;
        self.finish(stream).await
    }

    /// Read the response to a request already sent on `stream`.
    ///
    /// Never retried: the peer may have acted on the request.
    async fn finish(&self, mut stream: TcpStream) -> Result<Response, NetError> {
        let response = read_frame(&mut stream).await?.ok_or(NetError::Closed)?;
        self.put_idle(stream);
        Ok(response)
    }

    async fn dial(&self) -> Result<TcpStream, NetError> {
        let connect = TcpStream::connect(self.addr.as_str());
        let stream = match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(NetError::Connect {
                    addr: self.addr.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(NetError::Connect {
                    addr: self.addr.clone(),
                    reason: format!(
                        "timed out after {}ms",
                        self.config.connect_timeout.as_millis()
                    ),
                });
            }
        };
        stream.set_nodelay(true)?;
        debug!(addr = %self.addr, "connected");
        Ok(stream)
    }

    /// Number of pooled idle connections.
    #[cfg(test)]
    pub(crate) fn idle_len(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    /// Pop a pooled connection the peer has not closed while it sat idle.
    fn take_idle(&self) -> Option<TcpStream> {
        let mut idle = self.idle.lock().ok()?;
        while let Some(stream) = idle.pop() {
            if is_quiet(&stream) {
                return Some(stream);
            }
            debug!(addr = %self.addr, "dropping pooled connection closed by peer");
        }
        None
    }

    fn put_idle(&self, stream: TcpStream) {
        if let Ok(mut idle) = self.idle.lock()
            && idle.len() < self.config.max_idle
        {
            idle.push(stream);
        }
    }

    /// Turn a non-matching response into an error.
    fn unexpected(&self, response: Response) -> NetError {
        match response {
            Response::Error {
                kind: ErrorKind::NotFound,
                message,
            } => NetError::NotFound(message),
            Response::Error { kind, message } => NetError::Remote { kind, message },
            other => NetError::UnexpectedResponse(format!("{other:?} from {}", self.addr)),
        }
    }

    // -------------------------------------------------------------------
    // Typed calls
    // -------------------------------------------------------------------

    /// Check that the node is up and speaks the protocol.
    pub async fn ping(&self) -> Result<(), NetError> {
        match self.call(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(self.unexpected(other)),
        }
    }

    /// Ask the router for its registered nodes.
    pub async fn list_nodes(&self) -> Result<Vec<NodeAddr>, NetError> {
        match self.call(&Request::ListNodes).await? {
            Response::ListNodes { nodes } => Ok(nodes.into_iter().map(NodeAddr::from).collect()),
            other => Err(self.unexpected(other)),
        }
    }

    /// Ask the router to add a node and migrate keys onto it.
    pub async fn add_node(&self, node: &NodeAddr) -> Result<MigrationSummary, NetError> {
        let request = Request::AddNode {
            node_address: node.to_string(),
        };
        match self.call(&request).await? {
            Response::AddNode(summary) => Ok(summary),
            other => Err(self.unexpected(other)),
        }
    }

    /// Ask the router to remove a node and migrate its keys away.
    pub async fn remove_node(&self, node: &NodeAddr) -> Result<MigrationSummary, NetError> {
        let request = Request::RemoveNode {
            node_address: node.to_string(),
        };
        match self.call(&request).await? {
            Response::RemoveNode(summary) => Ok(summary),
            other => Err(self.unexpected(other)),
        }
    }
}

/// True if an idle connection has neither pending bytes nor a close from the peer.
fn is_quiet(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 1];
    matches!(stream.try_read(&mut buf), Err(e) if e.kind() == std::io::ErrorKind::WouldBlock)
}

#[async_trait::async_trait]
impl StorageClient for RpcClient {
    fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    async fn write_file(&self, key: &ContentKey, data: Bytes) -> Result<(), NetError> {
        let request = Request::WriteFile {
            video_id: key.video_id().to_string(),
            filename: key.filename().to_string(),
            data: data.to_vec(),
        };
        match self.call(&request).await? {
            Response::WriteFile { success: true } => Ok(()),
            Response::WriteFile { success: false } => Err(NetError::Remote {
                kind: ErrorKind::Internal,
                message: format!("{} refused write of {key}", self.addr),
            }),
            other => Err(self.unexpected(other)),
        }
    }

    async fn read_file(&self, key: &ContentKey) -> Result<Bytes, NetError> {
        let request = Request::ReadFile {
            video_id: key.video_id().to_string(),
            filename: key.filename().to_string(),
        };
        match self.call(&request).await? {
            Response::ReadFile { data } => Ok(Bytes::from(data)),
            other => Err(self.unexpected(other)),
        }
    }

    async fn delete_file(&self, key: &ContentKey) -> Result<(), NetError> {
        let request = Request::DeleteFile {
            video_id: key.video_id().to_string(),
            filename: key.filename().to_string(),
        };
        match self.call(&request).await? {
            Response::DeleteFile { success: true } => Ok(()),
            Response::DeleteFile { success: false } => Err(NetError::Remote {
                kind: ErrorKind::Internal,
                message: format!("{} refused delete of {key}", self.addr),
            }),
            other => Err(self.unexpected(other)),
        }
    }
}

/// [`NodeConnector`] that dials real nodes over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector {
    config: ClientConfig,
}

impl TcpConnector {
    /// Create a connector whose clients use `config`.
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl NodeConnector for TcpConnector {
    async fn connect(&self, addr: &NodeAddr) -> Result<Arc<dyn StorageClient>, NetError> {
        let client = RpcClient::connect(addr.clone(), self.config).await?;
        Ok(Arc::new(client))
    }
}
