//! Content routing and membership management for vidshard.
//!
//! The router is the single entry point for clients:
//!
//! - [`ContentRouter`] resolves each key's owner on the ring and forwards
//!   reads, writes and deletes to that storage node.
//! - [`MembershipManager`] adds and removes storage nodes, migrating every
//!   key whose owner changes (copy, then delete).
//! - [`RouterService`] exposes both over the vidshard wire protocol.
//!
//! Both share a [`RouterState`]: the current [`Topology`] snapshot and the
//! index of keys written through the router.

mod admin;
mod error;
mod membership;
mod router;
mod state;

#[cfg(test)]
mod tests;

pub use admin::RouterService;
pub use error::RouterError;
pub use membership::{DEFAULT_MIGRATION_CONCURRENCY, MembershipManager, MigrationReport};
pub use router::ContentRouter;
pub use state::{RouterState, Topology};
