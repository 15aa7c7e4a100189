//! In-memory content storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use tracing::debug;
use vidshard_types::ContentKey;

use crate::error::StoreError;
use crate::traits::ContentStore;

/// In-memory content store backed by a `RwLock<HashMap>`.
///
/// Useful for testing and for nodes started with the `memory` backend.
/// Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<ContentKey, Bytes>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Io(std::io::Error::other("memory store lock poisoned"))
}

#[async_trait::async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, key: &ContentKey, data: Bytes) -> Result<(), StoreError> {
        let mut map = self.files.write().map_err(|_| poisoned())?;
        debug!(%key, size = data.len(), "storing content in memory");
        map.insert(key.clone(), data);
        Ok(())
    }

    async fn get(&self, key: &ContentKey) -> Result<Bytes, StoreError> {
        let map = self.files.read().map_err(|_| poisoned())?;
        map.get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn delete(&self, key: &ContentKey) -> Result<(), StoreError> {
        let mut map = self.files.write().map_err(|_| poisoned())?;
        match map.remove(key) {
            Some(_) => {
                debug!(%key, "deleted content from memory");
                Ok(())
            }
            None => Err(StoreError::NotFound(key.clone())),
        }
    }

    async fn list(&self) -> Result<Vec<ContentKey>, StoreError> {
        let map = self.files.read().map_err(|_| poisoned())?;
        Ok(map.keys().cloned().collect())
    }
}
