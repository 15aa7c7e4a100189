//! Content storage for a single vidshard node.
//!
//! This crate defines the [`ContentStore`] trait for persisting video
//! segments under their [`ContentKey`](vidshard_types::ContentKey), along
//! with two backends:
//!
//! - [`FileStore`]: one file per key at `base_dir/video_id/filename`.
//! - [`MemoryStore`]: in-memory storage backed by a `RwLock<HashMap>`.
//!
//! [`StorageServer`] exposes a store over the vidshard wire protocol.

mod error;
mod file_store;
mod memory_store;
mod server;
mod traits;

pub use error::StoreError;
pub use file_store::FileStore;
pub use memory_store::MemoryStore;
pub use server::StorageServer;
pub use traits::ContentStore;
