//! File-based content storage backend.
//!
//! Stores one file per key at `{base_dir}/{video_id}/{filename}`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tracing::{debug, warn};
use vidshard_types::ContentKey;

use crate::error::StoreError;
use crate::traits::ContentStore;

/// File-based content store.
///
/// Each key is stored as a file at `{base_dir}/{video_id}/{filename}`.
///
/// Writes are atomic: data is written to a hidden temporary file in the
/// same directory, then renamed into place, so a reader never sees a
/// half-written segment.
pub struct FileStore {
    base_dir: PathBuf,
    /// Distinguishes temp files of concurrent writes to the same key.
    tmp_seq: AtomicU64,
}

impl FileStore {
    /// Create a new file store rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            tmp_seq: AtomicU64::new(0),
        })
    }

    /// The root directory of this store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn video_dir(&self, key: &ContentKey) -> PathBuf {
        self.base_dir.join(key.video_id())
    }

    /// Compute the full file path for a key.
    fn content_path(&self, key: &ContentKey) -> PathBuf {
        self.video_dir(key).join(key.filename())
    }

    fn tmp_path(&self, key: &ContentKey) -> PathBuf {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        self.video_dir(key)
            .join(format!(".{}.{seq}.tmp", key.filename()))
    }
}

/// Whether a directory entry is one of our in-flight temp files.
fn is_tmp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmp")
}

#[async_trait::async_trait]
impl ContentStore for FileStore {
    async fn put(&self, key: &ContentKey, data: Bytes) -> Result<(), StoreError> {
        let dir = self.video_dir(key);
        let path = self.content_path(key);
        let tmp_path = self.tmp_path(key);

        tokio::fs::create_dir_all(&dir).await?;
        match tokio::fs::write(&tmp_path, &data).await {
            Ok(()) => {}
            // A concurrent delete of the video's last file removed the
            // directory between create and write.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&dir).await?;
                tokio::fs::write(&tmp_path, &data).await?;
            }
            Err(e) => return Err(StoreError::Io(e)),
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(e));
        }

        debug!(%key, path = %path.display(), size = data.len(), "stored content to file");
        Ok(())
    }

    async fn get(&self, key: &ContentKey) -> Result<Bytes, StoreError> {
        let path = self.content_path(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.clone()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn delete(&self, key: &ContentKey) -> Result<(), StoreError> {
        let path = self.content_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(%key, "deleted content file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.clone()));
            }
            Err(e) => return Err(StoreError::Io(e)),
        }

        // Drop the video directory once it is empty. `remove_dir` refuses
        // non-empty directories, so a failure here just means other files
        // remain.
        let dir = self.video_dir(key);
        match tokio::fs::remove_dir(&dir).await {
            Ok(()) => debug!(video_id = key.video_id(), "removed empty video directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) if e.kind() == std::io::ErrorKind::DirectoryNotEmpty => {}
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to remove video directory")
            }
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ContentKey>, StoreError> {
        let mut keys = Vec::new();

        // Walk the two levels: base/<video_id>/<filename>
        let mut videos = tokio::fs::read_dir(&self.base_dir).await?;
        while let Some(video) = videos.next_entry().await? {
            if !video.file_type().await?.is_dir() {
                continue;
            }
            let Some(video_id) = video.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let mut files = tokio::fs::read_dir(video.path()).await?;
            while let Some(entry) = files.next_entry().await? {
                if !entry.file_type().await?.is_file() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str()
                    && !is_tmp_name(name)
                    && let Ok(key) = ContentKey::new(video_id.clone(), name)
                {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}
