//! Router state: topology snapshot and key index.
//!
//! [`RouterState`] is the shared, read-mostly structure behind both the
//! content path and the membership path. It holds:
//!
//! - the current [`Topology`] (ring + node clients + registration order),
//!   an immutable value behind an `Arc`, replaced wholesale on every join
//!   or leave;
//! - the key index: every key written through the router, with the
//!   topology version it was last written under.
//!
//! Both live behind one `std::sync::RwLock` so a membership commit and the
//! key-index snapshot it migrates from are taken atomically. The lock is
//! only held for in-memory work, never across an `.await`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;
use vidshard_net::StorageClient;
use vidshard_placement::Ring;
use vidshard_types::{ContentKey, NodeAddr};

use crate::error::RouterError;

/// One version of the cluster membership.
#[derive(Clone, Default)]
pub struct Topology {
    version: u64,
    ring: Ring,
    clients: HashMap<NodeAddr, Arc<dyn StorageClient>>,
    /// Registered nodes in registration order.
    order: Vec<NodeAddr>,
}

impl fmt::Debug for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topology")
            .field("version", &self.version)
            .field("nodes", &self.order)
            .finish_non_exhaustive()
    }
}

impl Topology {
    /// Monotonic version, bumped by every membership change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The ring for this membership.
    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    /// Registered nodes in registration order.
    pub fn nodes(&self) -> &[NodeAddr] {
        &self.order
    }

    /// Whether `addr` is registered.
    pub fn contains(&self, addr: &NodeAddr) -> bool {
        self.clients.contains_key(addr)
    }

    /// The client for a registered node.
    pub fn client(&self, addr: &NodeAddr) -> Option<Arc<dyn StorageClient>> {
        self.clients.get(addr).cloned()
    }

    /// Resolve `key`'s owner and its client.
    pub fn route(&self, key: &ContentKey) -> Result<(NodeAddr, Arc<dyn StorageClient>), RouterError> {
        let owner = self.ring.owner_of(key).ok_or(RouterError::NoNodes)?;
        let client = self.client(owner).ok_or(RouterError::NoNodes)?;
        Ok((owner.clone(), client))
    }

    /// The next version with `addr` registered.
    ///
    /// Fails without building anything if the address is already present or
    /// its ring point is taken.
    pub(crate) fn with_node(
        &self,
        addr: &NodeAddr,
        client: Arc<dyn StorageClient>,
    ) -> Result<Self, RouterError> {
        self.check_joinable(addr)?;
        let mut next = self.clone();
        next.version += 1;
        next.ring = self.ring.with_node(addr);
        next.clients.insert(addr.clone(), client);
        next.order.push(addr.clone());
        Ok(next)
    }

    /// The next version without `addr`.
    pub(crate) fn without_node(&self, addr: &NodeAddr) -> Result<Self, RouterError> {
        if !self.contains(addr) {
            return Err(RouterError::UnknownNode(addr.clone()));
        }
        let mut next = self.clone();
        next.version += 1;
        next.ring = self.ring.without_node(addr);
        next.clients.remove(addr);
        next.order.retain(|n| n != addr);
        Ok(next)
    }

    /// Check that `addr` could join this topology.
    pub(crate) fn check_joinable(&self, addr: &NodeAddr) -> Result<(), RouterError> {
        if self.contains(addr) {
            return Err(RouterError::DuplicateNode(addr.clone()));
        }
        if let Some(existing) = self.ring.collision(addr) {
            return Err(RouterError::HashCollision {
                addr: addr.clone(),
                existing: existing.clone(),
            });
        }
        Ok(())
    }
}

/// A membership change that was applied, with what migration needs.
#[derive(Debug)]
pub(crate) struct Commit {
    /// Topology before the change.
    pub old: Arc<Topology>,
    /// Topology after the change.
    pub new: Arc<Topology>,
    /// Key index at the moment of the change.
    pub keys: Vec<ContentKey>,
}

#[derive(Default)]
struct Inner {
    topology: Arc<Topology>,
    /// Key -> topology version of its last successful write.
    index: HashMap<ContentKey, u64>,
}

/// Outcome of [`RouterState::record_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recorded {
    /// The write landed on the key's current owner and is indexed.
    Current,
    /// The key's owner changed while the write was in flight.
    Moved,
}

/// Shared router state.
#[derive(Default)]
pub struct RouterState {
    inner: RwLock<Inner>,
}

impl fmt::Debug for RouterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topology = self.topology();
        f.debug_struct("RouterState")
            .field("topology", &topology)
            .finish_non_exhaustive()
    }
}

impl RouterState {
    /// Create an empty state: no nodes, no keys.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // A poisoned lock only means a panic happened mid-update of plain
    // in-memory data; every update leaves it consistent, so keep going.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// The current topology snapshot.
    pub fn topology(&self) -> Arc<Topology> {
        self.read().topology.clone()
    }

    /// Every key written through the router and not since deleted.
    pub fn keys(&self) -> Vec<ContentKey> {
        self.read().index.keys().cloned().collect()
    }

    /// Number of indexed keys.
    pub fn key_count(&self) -> usize {
        self.read().index.len()
    }

    /// Whether `key` is indexed.
    pub fn contains_key(&self, key: &ContentKey) -> bool {
        self.read().index.contains_key(key)
    }

    /// The topology version `key` was last written under.
    pub fn key_version(&self, key: &ContentKey) -> Option<u64> {
        self.read().index.get(key).copied()
    }

    /// Record a successful write of `key` to `owner`, routed with `routed`.
    ///
    /// If a membership change committed while the write was in flight and
    /// moved the key off `owner`, nothing is recorded and
    /// [`Recorded::Moved`] is returned: the bytes sit on a node reads no
    /// longer go to, and the caller must write again.
    pub(crate) fn record_write(
        &self,
        key: &ContentKey,
        routed: &Topology,
        owner: &NodeAddr,
    ) -> Recorded {
        let mut inner = self.write();
        let current = inner.topology.version();
        if current != routed.version() && inner.topology.ring().owner_of(key) != Some(owner) {
            return Recorded::Moved;
        }
        // Stamped with the live version: a migration planned by a commit the
        // write straddled must not overwrite it with an older copy.
        inner.index.insert(key.clone(), current);
        Recorded::Current
    }

    /// Drop `key` from the index after a confirmed delete.
    pub(crate) fn forget(&self, key: &ContentKey) {
        self.write().index.remove(key);
    }

    /// Apply a membership change.
    ///
    /// `change` builds the next topology from the current one; it runs
    /// under the exclusive lock, together with the key-index snapshot, so
    /// no write can slip between the two.
    pub(crate) fn commit<F>(&self, change: F) -> Result<Commit, RouterError>
    where
        F: FnOnce(&Topology, usize) -> Result<Topology, RouterError>,
    {
        let mut inner = self.write();
        let next = Arc::new(change(&inner.topology, inner.index.len())?);
        let old = std::mem::replace(&mut inner.topology, next.clone());
        let keys = inner.index.keys().cloned().collect();
        info!(
            version = next.version(),
            nodes = next.nodes().len(),
            "committed topology"
        );
        Ok(Commit {
            old,
            new: next,
            keys,
        })
    }
}
