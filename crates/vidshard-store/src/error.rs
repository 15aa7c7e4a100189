//! Error types for content storage operations.

use vidshard_types::{ContentKey, KeyError};

/// Errors that can occur during content storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No content is stored under the key.
    #[error("content not found: {0}")]
    NotFound(ContentKey),

    /// The request named an invalid key.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
