//! Storage node request handler.
//!
//! Adapts a [`ContentStore`] to the vidshard wire protocol so an
//! [`RpcServer`](vidshard_net::RpcServer) can serve it.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};
use vidshard_net::{ErrorKind, Request, RequestHandler, Response};
use vidshard_types::ContentKey;

use crate::error::StoreError;
use crate::traits::ContentStore;

/// Serves content requests from a node-local store.
///
/// Admin requests (`ListNodes`, `AddNode`, `RemoveNode`) belong to the
/// router and are answered with [`ErrorKind::Unimplemented`].
#[derive(Clone)]
pub struct StorageServer {
    store: Arc<dyn ContentStore>,
}

impl fmt::Debug for StorageServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageServer").finish_non_exhaustive()
    }
}

impl StorageServer {
    /// Create a handler over `store`.
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Store `data` under `(video_id, filename)`.
    pub async fn write_file(
        &self,
        video_id: &str,
        filename: &str,
        data: Bytes,
    ) -> Result<(), StoreError> {
        let key = ContentKey::new(video_id, filename)?;
        self.store.put(&key, data).await
    }

    /// Fetch the bytes stored under `(video_id, filename)`.
    pub async fn read_file(&self, video_id: &str, filename: &str) -> Result<Bytes, StoreError> {
        let key = ContentKey::new(video_id, filename)?;
        self.store.get(&key).await
    }

    /// Remove the content stored under `(video_id, filename)`.
    pub async fn delete_file(&self, video_id: &str, filename: &str) -> Result<(), StoreError> {
        let key = ContentKey::new(video_id, filename)?;
        self.store.delete(&key).await
    }
}

/// Map a store error onto the wire.
fn error_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(key) => {
            debug!(%key, "content not found");
            Response::error(ErrorKind::NotFound, format!("content not found: {key}"))
        }
        StoreError::InvalidKey(e) => Response::error(ErrorKind::InvalidArgument, e.to_string()),
        StoreError::Io(e) => {
            warn!(error = %e, "storage i/o failure");
            Response::error(ErrorKind::Internal, e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl RequestHandler for StorageServer {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::WriteFile {
                video_id,
                filename,
                data,
            } => match self.write_file(&video_id, &filename, Bytes::from(data)).await {
                Ok(()) => Response::WriteFile { success: true },
                Err(e) => error_response(e),
            },
            Request::ReadFile { video_id, filename } => {
                match self.read_file(&video_id, &filename).await {
                    Ok(data) => Response::ReadFile {
                        data: data.to_vec(),
                    },
                    Err(e) => error_response(e),
                }
            }
            Request::DeleteFile { video_id, filename } => {
                match self.delete_file(&video_id, &filename).await {
                    Ok(()) => Response::DeleteFile { success: true },
                    Err(e) => error_response(e),
                }
            }
            Request::Ping => Response::Pong,
            Request::ListNodes | Request::AddNode { .. } | Request::RemoveNode { .. } => {
                Response::error(
                    ErrorKind::Unimplemented,
                    "membership requests must be sent to the router",
                )
            }
        }
    }
}
