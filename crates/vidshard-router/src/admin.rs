//! Wire protocol handler for the router.
//!
//! Serves the admin requests (`ListNodes`, `AddNode`, `RemoveNode`) and
//! forwards content requests through the [`ContentRouter`], so storage
//! clients can talk to the router exactly as they would to a single node.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};
use vidshard_net::{ErrorKind, MigrationSummary, Request, RequestHandler, Response};
use vidshard_types::NodeAddr;

use crate::error::RouterError;
use crate::membership::MembershipManager;
use crate::router::ContentRouter;

/// The router's request handler.
#[derive(Debug, Clone)]
pub struct RouterService {
    router: ContentRouter,
    membership: Arc<MembershipManager>,
}

impl RouterService {
    /// Create a handler over a router and its membership manager.
    ///
    /// Both must share the same [`RouterState`](crate::RouterState).
    pub fn new(router: ContentRouter, membership: Arc<MembershipManager>) -> Self {
        Self { router, membership }
    }

    /// The content router.
    pub fn router(&self) -> &ContentRouter {
        &self.router
    }

    /// The membership manager.
    pub fn membership(&self) -> &Arc<MembershipManager> {
        &self.membership
    }

    async fn add_node(&self, node_address: &str) -> Response {
        let addr = match parse_addr(node_address) {
            Ok(addr) => addr,
            Err(response) => return response,
        };
        match self.membership.add_node(&addr).await {
            Ok(report) => Response::AddNode(report.summary()),
            Err(e) => {
                warn!(node = %addr, error = %e, "add node rejected");
                error_response(&e)
            }
        }
    }

    async fn remove_node(&self, node_address: &str) -> Response {
        let addr = match parse_addr(node_address) {
            Ok(addr) => addr,
            Err(response) => return response,
        };
        match self.membership.remove_node(&addr).await {
            Ok(report) => Response::RemoveNode(report.summary()),
            // Removing a node that is not there is a no-op, not a failure.
            Err(RouterError::UnknownNode(_)) => {
                warn!(node = %addr, "remove requested for unregistered node");
                Response::RemoveNode(MigrationSummary::default())
            }
            Err(e) => {
                warn!(node = %addr, error = %e, "remove node rejected");
                error_response(&e)
            }
        }
    }
}

fn parse_addr(node_address: &str) -> Result<NodeAddr, Response> {
    let addr = NodeAddr::new(node_address);
    if addr.as_str().is_empty() {
        return Err(Response::error(
            ErrorKind::InvalidArgument,
            "node address must not be empty",
        ));
    }
    Ok(addr)
}

fn error_response(err: &RouterError) -> Response {
    Response::error(err.kind(), err.to_string())
}

#[async_trait::async_trait]
impl RequestHandler for RouterService {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::WriteFile {
                video_id,
                filename,
                data,
            } => match self
                .router
                .write(&video_id, &filename, Bytes::from(data))
                .await
            {
                Ok(()) => Response::WriteFile { success: true },
                Err(e) => error_response(&e),
            },
            Request::ReadFile { video_id, filename } => {
                match self.router.read(&video_id, &filename).await {
                    Ok(data) => Response::ReadFile {
                        data: data.to_vec(),
                    },
                    Err(e) => error_response(&e),
                }
            }
            Request::DeleteFile { video_id, filename } => {
                match self.router.delete(&video_id, &filename).await {
                    Ok(()) => Response::DeleteFile { success: true },
                    Err(e) => error_response(&e),
                }
            }
            Request::ListNodes => Response::ListNodes {
                nodes: self
                    .router
                    .nodes()
                    .into_iter()
                    .map(|n| n.to_string())
                    .collect(),
            },
            Request::AddNode { node_address } => {
                info!(node = %node_address, "add node requested");
                self.add_node(&node_address).await
            }
            Request::RemoveNode { node_address } => {
                info!(node = %node_address, "remove node requested");
                self.remove_node(&node_address).await
            }
            Request::Ping => Response::Pong,
        }
    }
}
