//! Filesystem byte store
//!
//! One file per key. Writes go to a temp file that is fsynced and then
//! renamed over the document, so a reader sees either the old or the new
//! payload and never a torn one.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::error::{KvError, Result};

use super::{validate_key, ByteStore};

/// Byte store keeping `{key}.json` files in a single directory
pub struct FileStore {
    /// Directory holding the documents
    root: PathBuf,

    /// Suffix for temp file names (atomic, lock-free)
    next_tmp_id: AtomicU64,
}

impl FileStore {
    const EXTENSION: &'static str = "json";

    /// Open or create a store rooted at `path`
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;

        Ok(Self {
            root: path.to_path_buf(),
            next_tmp_id: AtomicU64::new(0),
        })
    }

    /// The directory holding the documents
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path of the document stored under `key`
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(format!("{}.{}", key, Self::EXTENSION)))
    }

    fn tmp_path_for(&self, key: &str) -> PathBuf {
        let n = self.next_tmp_id.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!(".{}.{}.{}.tmp", key, Self::EXTENSION, n))
    }

    async fn write_atomic(&self, tmp: &Path, target: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::File::create(tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(tmp, target).await
    }
}

#[async_trait]
impl ByteStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.path_for(key)?;

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KvError::Io(e)),
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = self.tmp_path_for(key);

        if let Err(e) = self.write_atomic(&tmp, &path, &data).await {
            // Best effort: the temp file may not even exist
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(KvError::StoreFailure(format!(
                "failed to persist {}: {}",
                path.display(),
                e
            )));
        }

        tracing::trace!(key, bytes = data.len(), "document persisted");
        Ok(())
    }
}
