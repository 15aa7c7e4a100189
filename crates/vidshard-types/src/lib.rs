//! Shared types and identifiers for vidshard.
//!
//! This crate defines the core types used across the workspace:
//! node addresses ([`NodeAddr`]), content keys ([`ContentKey`]) and the
//! hash function that places both on the ring ([`hash_point`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Map arbitrary bytes to a position on the ring.
///
/// The position is the first 8 bytes of `SHA-256(data)`, read big-endian.
/// Node addresses and canonical content keys share this hash space.
pub fn hash_point(data: &[u8]) -> u64 {
    let digest = Sha256::digest(data);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

// ---------------------------------------------------------------------------
// Node addresses
// ---------------------------------------------------------------------------

/// Network address of a storage node (`host:port`).
///
/// The address string is also the node's identity: its ring position is
/// `hash_point(address)`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddr(String);

impl NodeAddr {
    /// Wrap an address string. Surrounding whitespace is trimmed.
    pub fn new(addr: impl AsRef<str>) -> Self {
        Self(addr.as_ref().trim().to_string())
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// This node's position on the ring.
    pub fn hash_point(&self) -> u64 {
        hash_point(self.0.as_bytes())
    }
}

impl From<&str> for NodeAddr {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeAddr {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for NodeAddr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAddr({})", self.0)
    }
}

/// Parse a comma-separated node list (`"a:1,b:2"`), skipping empty entries.
pub fn parse_node_list(s: &str) -> Vec<NodeAddr> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(NodeAddr::new)
        .collect()
}

// ---------------------------------------------------------------------------
// Content keys
// ---------------------------------------------------------------------------

/// A component of a content key was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The component is empty.
    #[error("{field} must not be empty")]
    Empty {
        /// Which component (`video_id` or `filename`).
        field: &'static str,
    },

    /// The component could escape the node's base directory or contains
    /// a character that is not allowed in a path segment.
    #[error("{field} is not a valid path segment: {value:?}")]
    InvalidSegment {
        /// Which component (`video_id` or `filename`).
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A canonical key string did not contain the `/` separator.
    #[error("malformed canonical key: {0:?}")]
    Malformed(String),
}

/// Identifies one stored content chunk: `(video_id, filename)`.
///
/// Both components are single path segments, so a key always maps to
/// exactly one file at `base_dir/video_id/filename` on its owner.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentKey {
    video_id: String,
    filename: String,
}

impl ContentKey {
    /// Build a key, validating both components.
    pub fn new(video_id: impl Into<String>, filename: impl Into<String>) -> Result<Self, KeyError> {
        let video_id = video_id.into();
        let filename = filename.into();
        validate_segment("video_id", &video_id)?;
        validate_segment("filename", &filename)?;
        Ok(Self { video_id, filename })
    }

    /// Parse a canonical `video_id/filename` string.
    ///
    /// The split happens at the first `/`; a filename containing further
    /// slashes is rejected by validation.
    pub fn parse(canonical: &str) -> Result<Self, KeyError> {
        let (video_id, filename) = canonical
            .split_once('/')
            .ok_or_else(|| KeyError::Malformed(canonical.to_string()))?;
        Self::new(video_id, filename)
    }

    /// The video identifier.
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// The file name within the video's directory.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Canonical string form: `video_id/filename`.
    pub fn canonical(&self) -> String {
        format!("{}/{}", self.video_id, self.filename)
    }

    /// This key's position on the ring: `hash_point(canonical())`.
    pub fn hash_point(&self) -> u64 {
        hash_point(self.canonical().as_bytes())
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.video_id, self.filename)
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({self})")
    }
}

fn validate_segment(field: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::Empty { field });
    }
    let bad = value == "."
        || value == ".."
        || value.contains('/')
        || value.contains('\\')
        || value.contains('\0');
    if bad {
        return Err(KeyError::InvalidSegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
