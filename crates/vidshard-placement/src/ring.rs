//! Consistent hashing ring implementation.

use std::collections::HashMap;

use tracing::debug;
use vidshard_types::{ContentKey, NodeAddr};

/// A key whose owner differs between two ring states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassignment {
    /// The key that must move.
    pub key: ContentKey,
    /// Owner under the old ring (where the data currently lives).
    pub from: NodeAddr,
    /// Owner under the new ring (where the data must end up).
    pub to: NodeAddr,
}

/// Consistent hashing ring with one point per node.
///
/// A `Ring` is an immutable value for a given membership: joins and leaves
/// produce a new ring ([`Ring::with_node`], [`Ring::without_node`]) rather
/// than mutating the one readers are using. Lookup depends only on the set
/// of nodes, never on the order in which they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ring {
    /// Node positions, sorted ascending, no duplicates.
    points: Vec<u64>,
    /// Ring position -> node at that position.
    owners: HashMap<u64, NodeAddr>,
}

impl Ring {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ring from scratch for the given node set.
    ///
    /// Duplicate addresses collapse to one point. If two distinct addresses
    /// hash to the same point, the lexicographically smaller address wins, so
    /// the result never depends on input order.
    pub fn from_nodes<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = NodeAddr>,
    {
        let mut placed: Vec<(u64, NodeAddr)> = nodes
            .into_iter()
            .map(|addr| (addr.hash_point(), addr))
            .collect();
        placed.sort();
        placed.dedup_by_key(|(point, _)| *point);

        let points = placed.iter().map(|(point, _)| *point).collect();
        let owners = placed.into_iter().collect();
        Self { points, owners }
    }

    /// Replace this ring's contents with a fresh build over `nodes`.
    pub fn rebuild<I>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = NodeAddr>,
    {
        *self = Self::from_nodes(nodes);
        debug!(nodes = self.len(), "rebuilt ring");
    }

    /// Return a new ring that also contains `addr`.
    pub fn with_node(&self, addr: &NodeAddr) -> Self {
        let mut nodes = self.nodes();
        nodes.push(addr.clone());
        Self::from_nodes(nodes)
    }

    /// Return a new ring without `addr`.
    pub fn without_node(&self, addr: &NodeAddr) -> Self {
        Self::from_nodes(self.nodes().into_iter().filter(|n| n != addr))
    }

    /// Resolve a ring position to its owning node.
    ///
    /// Returns the node at the smallest point `>= hash`, or the node at the
    /// smallest point overall when `hash` is past every point. `None` only
    /// for an empty ring.
    pub fn resolve(&self, hash: u64) -> Option<&NodeAddr> {
        if self.points.is_empty() {
            return None;
        }
        let idx = self.points.partition_point(|&point| point < hash);
        let point = self.points.get(idx).unwrap_or(&self.points[0]);
        self.owners.get(point)
    }

    /// Resolve the owner of a content key.
    pub fn owner_of(&self, key: &ContentKey) -> Option<&NodeAddr> {
        self.resolve(key.hash_point())
    }

    /// Whether `addr` currently holds a point on the ring.
    pub fn contains(&self, addr: &NodeAddr) -> bool {
        self.owners.get(&addr.hash_point()) == Some(addr)
    }

    /// The ring position `addr` would occupy.
    pub fn point_of(addr: &NodeAddr) -> u64 {
        addr.hash_point()
    }

    /// If a *different* node already occupies `addr`'s point, return it.
    pub fn collision(&self, addr: &NodeAddr) -> Option<&NodeAddr> {
        self.owners
            .get(&addr.hash_point())
            .filter(|existing| *existing != addr)
    }

    /// All nodes in ring order (ascending hash point).
    pub fn nodes(&self) -> Vec<NodeAddr> {
        self.points
            .iter()
            .filter_map(|point| self.owners.get(point).cloned())
            .collect()
    }

    /// The sorted hash points.
    pub fn points(&self) -> &[u64] {
        &self.points
    }

    /// Number of nodes on the ring.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the ring has no nodes.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Compute which keys change owner between two ring states.
    ///
    /// Keys that have no owner in either ring are skipped: there is nothing
    /// to copy from, or nowhere to copy to.
    pub fn reassignments<'a, I>(old: &Ring, new: &Ring, keys: I) -> Vec<Reassignment>
    where
        I: IntoIterator<Item = &'a ContentKey>,
    {
        keys.into_iter()
            .filter_map(|key| {
                let hash = key.hash_point();
                let from = old.resolve(hash)?;
                let to = new.resolve(hash)?;
                (from != to).then(|| Reassignment {
                    key: key.clone(),
                    from: from.clone(),
                    to: to.clone(),
                })
            })
            .collect()
    }
}
