//! Core trait for content storage.

use bytes::Bytes;
use vidshard_types::ContentKey;

use crate::error::StoreError;

/// Trait for storing and retrieving content by key.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// Keys are already validated, so a backend may map them directly to paths.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous content.
    ///
    /// Writing the same bytes twice leaves the store unchanged.
    async fn put(&self, key: &ContentKey, data: Bytes) -> Result<(), StoreError>;

    /// Retrieve the content under `key`, or [`StoreError::NotFound`].
    async fn get(&self, key: &ContentKey) -> Result<Bytes, StoreError>;

    /// Remove the content under `key`, or [`StoreError::NotFound`] if absent.
    async fn delete(&self, key: &ContentKey) -> Result<(), StoreError>;

    /// List every stored key.
    async fn list(&self) -> Result<Vec<ContentKey>, StoreError>;
}
