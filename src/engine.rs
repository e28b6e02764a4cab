//! Engine Module
//!
//! The per-key operation protocol tying the byte store, the key lock manager,
//! the notification registry, and the merge policies together.
//!
//! ## Responsibilities
//! - Run every read-modify-write for a key inside that key's critical section
//! - Persist fully before notifying waiters
//! - Register long-poll waiters inside the critical section, then wait outside it
//! - Surface NotFound / StoreFailure to the caller without writing or notifying

use std::sync::Arc;

use bytes::Bytes;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::lock::KeyLockManager;
use crate::merge::{merge_recursive, merge_replace, Document};
use crate::notify::{NotificationRegistry, WaitOutcome, Waiter};
use crate::protocol::Command;
use crate::storage::{ByteStore, FileStore};

/// Result of a long-poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The document already existed; no waiter was registered
    Ready(Document),

    /// Delivered by a write that happened while waiting
    Updated(Document),

    /// No write arrived in time
    TimedOut,
}

impl PollOutcome {
    /// The document carried by this outcome, if any
    pub fn into_document(self) -> Option<Document> {
        match self {
            PollOutcome::Ready(document) | PollOutcome::Updated(document) => Some(document),
            PollOutcome::TimedOut => None,
        }
    }
}

impl From<WaitOutcome> for PollOutcome {
    fn from(outcome: WaitOutcome) -> Self {
        match outcome {
            WaitOutcome::Updated(document) => PollOutcome::Updated(document),
            WaitOutcome::TimedOut => PollOutcome::TimedOut,
        }
    }
}

/// Result of executing a [`Command`]
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A document to return to the client
    Document(Document),

    /// A write completed
    Written,

    /// A long-poll expired
    TimedOut,
}

/// What a long-poll found while holding the key's lock
enum Registration<'a> {
    Ready(Document),
    Waiting(Waiter<'a>),
}

/// The document store engine
///
/// ## Concurrency Model: one critical section per key
///
/// - **fetch / replace / assign / patch**: the whole read-modify-write runs
///   under `locks.with_lock(key, ..)`
/// - **poll / watch**: only the existence check and waiter registration run
///   under the lock; the wait itself happens after release so writers can
///   reach `notify`
/// - Distinct keys never contend
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Durable key -> bytes mapping
    store: Arc<dyn ByteStore>,

    /// Per-key mutual exclusion
    locks: KeyLockManager,

    /// Long-poll waiters
    registry: NotificationRegistry,
}

impl Engine {
    /// Open an engine backed by a [`FileStore`] in `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let store = FileStore::open(&config.data_dir)?;
        Self::with_store(config, Arc::new(store))
    }

    /// Build an engine over any byte store
    pub fn with_store(config: Config, store: Arc<dyn ByteStore>) -> Result<Self> {
        config.validate()?;
        let registry = NotificationRegistry::new(config.long_poll_timeout());

        Ok(Self {
            config,
            store,
            locks: KeyLockManager::new(),
            registry,
        })
    }

    /// Execute a command
    ///
    /// Routes commands to appropriate handlers
    pub async fn execute(&self, command: Command) -> Result<Reply> {
        match command {
            Command::Fetch { key } => self.fetch(&key).await.map(Reply::Document),
            Command::Poll { key } => self.poll(&key).await.map(Reply::from),
            Command::Watch { key } => self.watch(&key).await.map(Reply::from),
            Command::Replace { key, document } => {
                self.replace(&key, document).await?;
                Ok(Reply::Written)
            }
            Command::Assign { key, partial } => {
                self.assign(&key, partial).await?;
                Ok(Reply::Written)
            }
            Command::Patch { key, partial } => {
                self.patch(&key, partial).await?;
                Ok(Reply::Written)
            }
        }
    }

    /// Read the document stored under `key`
    pub async fn fetch(&self, key: &str) -> Result<Document> {
        check_key(key)?;

        self.locks
            .with_lock(key, || async {
                self.read(key).await?.ok_or_else(|| KvError::not_found(key))
            })
            .await
    }

    /// Replace the document under `key` wholesale, creating it if absent
    pub async fn replace(&self, key: &str, document: Document) -> Result<()> {
        check_key(key)?;
        let data = encode(&document)?;

        self.locks
            .with_lock(key, || async move { self.persist_and_notify(key, data, &document).await })
            .await
    }

    /// Overwrite top-level fields of an existing document
    pub async fn assign(&self, key: &str, partial: Document) -> Result<Document> {
        self.update(key, partial, merge_replace).await
    }

    /// Deep-merge into an existing document
    pub async fn patch(&self, key: &str, partial: Document) -> Result<Document> {
        self.update(key, partial, merge_recursive).await
    }

    /// Return the document if it exists, otherwise wait for the next write
    pub async fn poll(&self, key: &str) -> Result<PollOutcome> {
        check_key(key)?;

        let registration = self
            .locks
            .with_lock(key, || async move {
                match self.read(key).await? {
                    Some(document) => Ok::<_, KvError>(Registration::Ready(document)),
                    None => Ok(Registration::Waiting(self.registry.wait(key))),
                }
            })
            .await?;

        match registration {
            Registration::Ready(document) => Ok(PollOutcome::Ready(document)),
            Registration::Waiting(waiter) => Ok(waiter.recv().await.into()),
        }
    }

    /// Wait for the next write to `key`, ignoring its current content
    pub async fn watch(&self, key: &str) -> Result<PollOutcome> {
        check_key(key)?;

        let waiter = self
            .locks
            .with_lock(key, || async move { self.registry.wait(key) })
            .await;

        Ok(waiter.recv().await.into())
    }

    /// Read, merge, persist, notify; all under the key's lock
    async fn update(
        &self,
        key: &str,
        partial: Document,
        merge: fn(Document, Document) -> Document,
    ) -> Result<Document> {
        check_key(key)?;

        self.locks
            .with_lock(key, || async move {
                let current = self
                    .read(key)
                    .await?
                    .ok_or_else(|| KvError::not_found(key))?;

                let updated = merge(current, partial);
                let data = encode(&updated)?;
                self.persist_and_notify(key, data, &updated).await?;

                Ok::<_, KvError>(updated)
            })
            .await
    }

    /// Load and parse the stored document (caller holds the key's lock)
    async fn read(&self, key: &str) -> Result<Option<Document>> {
        let Some(data) = self.store.get(key).await? else {
            return Ok(None);
        };

        serde_json::from_slice(&data).map(Some).map_err(|e| {
            KvError::Serialization(format!("stored document {key:?} is not valid JSON: {e}"))
        })
    }

    /// Persist, and only on success wake the key's waiters (caller holds the lock)
    async fn persist_and_notify(&self, key: &str, data: Bytes, document: &Document) -> Result<()> {
        if let Err(e) = self.store.put(key, data).await {
            tracing::warn!(key, error = %e, "write failed, waiters not notified");
            return Err(match e {
                KvError::Io(io) => KvError::StoreFailure(io.to_string()),
                other => other,
            });
        }

        let delivered = self.registry.notify(key, document);
        tracing::debug!(key, delivered, "document written");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the key lock manager
    pub fn locks(&self) -> &KeyLockManager {
        &self.locks
    }

    /// Get the notification registry
    pub fn registry(&self) -> &NotificationRegistry {
        &self.registry
    }
}

impl From<PollOutcome> for Reply {
    fn from(outcome: PollOutcome) -> Self {
        match outcome.into_document() {
            Some(document) => Reply::Document(document),
            None => Reply::TimedOut,
        }
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(KvError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}

fn encode(document: &Document) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(document)?))
}
