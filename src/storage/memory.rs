//! In-memory byte store
//!
//! Used by tests and by the server's `--in-memory` mode.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{KvError, Result};

use super::ByteStore;

/// HashMap-backed byte store; contents vanish with the process
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }
}

#[async_trait]
impl ByteStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        if key.is_empty() {
            return Err(KvError::InvalidKey("key must not be empty".to_string()));
        }
        self.entries.write().insert(key.to_string(), data);
        Ok(())
    }
}
