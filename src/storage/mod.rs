//! Storage Module
//!
//! The durable byte store documents live in.
//!
//! ## Responsibilities
//! - Map a key to an opaque byte payload
//! - Signal a missing key as `Ok(None)`, never as an error
//! - Make every single `get`/`put` atomic on its own
//!
//! Nothing here coordinates concurrent callers across calls: read-modify-write
//! atomicity comes from [`crate::lock::KeyLockManager`] one layer up.
//!
//! ## On-disk Layout (FileStore)
//! ```text
//! {data_dir}/
//!   ├── {key}.json            (current document)
//!   └── .{key}.json.{n}.tmp   (in-flight write, renamed over the document)
//! ```

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{KvError, Result};

/// Durable mapping from key to bytes
///
/// Implementations must be `Send + Sync`; the engine shares one instance
/// across every connection task.
#[async_trait]
pub trait ByteStore: Send + Sync {
    /// Read the payload stored under `key`, `None` if there is none
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store `data` under `key`, replacing any previous payload
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;
}

/// Reject keys that cannot be used directly as a file name
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(KvError::InvalidKey("key must not be empty".to_string()));
    }
    if key.starts_with('.') {
        return Err(KvError::InvalidKey(format!("{key:?} must not start with '.'")));
    }
    if key.contains(['/', '\\', '\0']) {
        return Err(KvError::InvalidKey(format!(
            "{key:?} must not contain path separators or NUL"
        )));
    }
    Ok(())
}
