//! TCP accept loop dispatching request frames to a handler.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::NetError;
use crate::frame::{read_frame, write_frame};
use crate::message::{Request, Response};

/// Handles decoded requests for an [`RpcServer`].
///
/// Every request gets exactly one response; failures are expressed as
/// [`Response::Error`].
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Process one request.
    async fn handle(&self, request: Request) -> Response;
}

/// A bound TCP listener serving the vidshard protocol.
pub struct RpcServer {
    listener: TcpListener,
}

impl RpcServer {
    /// Bind to `addr` (e.g. `"127.0.0.1:8090"`, port 0 for an ephemeral port).
    pub async fn bind(addr: &str) -> Result<Self, NetError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Wrap an already-bound listener.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener }
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process exits.
    pub async fn serve(self, handler: Arc<dyn RequestHandler>) -> Result<(), NetError> {
        self.serve_with_shutdown(handler, std::future::pending())
            .await
    }

    /// Serve until `shutdown` completes.
    ///
    /// Each connection runs in its own task; connections already accepted
    /// finish their in-flight request after shutdown.
    pub async fn serve_with_shutdown(
        self,
        handler: Arc<dyn RequestHandler>,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), NetError> {
        let local = self.listener.local_addr()?;
        info!(addr = %local, "rpc server listening");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(addr = %local, "rpc server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, handler).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                    }
                },
            }
        }
    }
}

/// Serve sequential requests on one connection until the peer hangs up.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn RequestHandler>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, error = %e, "failed to set TCP_NODELAY");
    }

    loop {
        let request: Request = match read_frame(&mut stream).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) => {
                debug!(%peer, error = %e, "dropping connection after bad frame");
                break;
            }
        };

        let response = handler.handle(request).await;
        if let Err(e) = write_frame(&mut stream, &response).await {
            debug!(%peer, error = %e, "failed to write response");
            break;
        }
    }
    debug!(%peer, "connection closed");
}
