//! Content routing: key -> owning storage node.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};
use vidshard_net::StorageClient;
use vidshard_types::{ContentKey, NodeAddr};

use crate::error::RouterError;
use crate::state::{Recorded, RouterState};

/// Times a write is re-issued when membership changes move its key.
const MAX_WRITE_ATTEMPTS: usize = 4;

/// Forwards content operations to the node that owns each key.
///
/// Every call resolves the owner against the topology snapshot current at
/// the start of the call and releases the state lock before any network
/// I/O, so calls on distinct keys run fully in parallel.
#[derive(Debug, Clone)]
pub struct ContentRouter {
    state: Arc<RouterState>,
}

impl ContentRouter {
    /// Create a router over shared state.
    pub fn new(state: Arc<RouterState>) -> Self {
        Self { state }
    }

    /// The shared state.
    pub fn state(&self) -> &Arc<RouterState> {
        &self.state
    }

    /// Fetch the content stored under `(video_id, filename)`.
    pub async fn read(&self, video_id: &str, filename: &str) -> Result<Bytes, RouterError> {
        let key = ContentKey::new(video_id, filename)?;
        let (owner, client) = self.state.topology().route(&key)?;
        debug!(%key, %owner, "routing read");
        client
            .read_file(&key)
            .await
            .map_err(|e| RouterError::from_net(&key, e))
    }

    /// Store `data` under `(video_id, filename)` on its owner.
    ///
    /// On success the key is recorded in the key index so later membership
    /// changes migrate it. A join or leave that moves the key while the
    /// write is in flight makes the write go again to the new owner; the
    /// copy left on the former owner is then removed.
    pub async fn write(
        &self,
        video_id: &str,
        filename: &str,
        data: Bytes,
    ) -> Result<(), RouterError> {
        let key = ContentKey::new(video_id, filename)?;
        let mut stale: Vec<Arc<dyn StorageClient>> = Vec::new();
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let topology = self.state.topology();
            let (owner, client) = topology.route(&key)?;
            debug!(%key, %owner, size = data.len(), attempt, "routing write");
            client
                .write_file(&key, data.clone())
                .await
                .map_err(|e| RouterError::from_net(&key, e))?;
            match self.state.record_write(&key, &topology, &owner) {
                Recorded::Current => {
                    for old in stale.iter().filter(|c| c.addr() != &owner) {
                        self.drop_stale(&key, old.as_ref()).await;
                    }
                    return Ok(());
                }
                Recorded::Moved => {
                    debug!(%key, from = %owner, "owner moved during write, writing again");
                    stale.push(client);
                }
            }
        }
        warn!(%key, attempts = MAX_WRITE_ATTEMPTS, "write not acknowledged, membership kept changing");
        Err(RouterError::OwnerMoved(key))
    }

    /// Delete the copy a re-routed write left on a former owner.
    async fn drop_stale(&self, key: &ContentKey, node: &dyn StorageClient) {
        // Another change may have made it the owner again.
        if self.state.topology().ring().owner_of(key) == Some(node.addr()) {
            return;
        }
        match node.delete_file(key).await {
            Ok(()) => debug!(%key, node = %node.addr(), "removed copy left by re-routed write"),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!(%key, node = %node.addr(), error = %e, "failed to remove copy left by re-routed write")
            }
        }
    }

    /// Remove the content stored under `(video_id, filename)`.
    ///
    /// The key leaves the index once its owner confirms it is gone, either
    /// by deleting it or by reporting it absent. An absent key is still
    /// returned as [`RouterError::NotFound`].
    pub async fn delete(&self, video_id: &str, filename: &str) -> Result<(), RouterError> {
        let key = ContentKey::new(video_id, filename)?;
        let (owner, client) = self.state.topology().route(&key)?;
        debug!(%key, %owner, "routing delete");
        match client.delete_file(&key).await {
            Ok(()) => {
                self.state.forget(&key);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                self.state.forget(&key);
                Err(RouterError::NotFound(key))
            }
            Err(e) => Err(RouterError::Net(e)),
        }
    }

    /// The node that currently owns `(video_id, filename)`.
    pub fn owner_of(&self, video_id: &str, filename: &str) -> Result<NodeAddr, RouterError> {
        let key = ContentKey::new(video_id, filename)?;
        let topology = self.state.topology();
        topology
            .ring()
            .owner_of(&key)
            .cloned()
            .ok_or(RouterError::NoNodes)
    }

    /// Every key written through this router and not since deleted.
    pub fn keys(&self) -> Vec<ContentKey> {
        self.state.keys()
    }

    /// Registered nodes in registration order.
    pub fn nodes(&self) -> Vec<NodeAddr> {
        self.state.topology().nodes().to_vec()
    }
}
