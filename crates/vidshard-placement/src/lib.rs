//! Consistent hashing ring for deterministic content placement.
//!
//! This crate implements the ring that maps content keys to storage nodes.
//! Every node occupies exactly one point on a `u64` ring, at
//! `sha256(address)[..8]` read big-endian. A key is owned by the first node
//! point at or after the key's own position, wrapping around to the lowest
//! point.
//!
//! One point per node keeps the mapping easy to reason about, at the cost of
//! load skew when the cluster is small. Giving each node several points
//! (virtual nodes) would smooth the distribution without changing lookup or
//! migration planning.

mod ring;

pub use ring::{Reassignment, Ring};
