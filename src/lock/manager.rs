//! Key Lock Manager implementation
//!
//! Lazily created per-key FIFO queues with direct ownership handoff.

use std::collections::{HashMap, VecDeque};
use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Contenders waiting behind the current holder of one key
#[derive(Default)]
struct KeyQueue {
    waiting: VecDeque<oneshot::Sender<()>>,
}

/// Grants one exclusive critical section per key at a time
///
/// ## Concurrency:
/// - `table`: one entry per held key, removed when its queue drains
/// - All methods use `&self`; safe to share behind an `Arc`
pub struct KeyLockManager {
    table: Mutex<HashMap<String, KeyQueue>>,
}

impl KeyLockManager {
    /// Create a manager with no tracked keys
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Run `action` with exclusive ownership of `key`
    ///
    /// The lock is released when the action's future completes, whatever its
    /// output, and also if the returned future is dropped early.
    pub async fn with_lock<F, Fut, T>(&self, key: &str, action: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        action().await
    }

    /// Wait for exclusive ownership of `key`
    ///
    /// Contenders are served strictly in the order this method was called.
    pub async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        // Enqueue synchronously so arrival order is fixed before any await
        let rx = {
            let mut table = self.table.lock();
            match table.get_mut(key) {
                None => {
                    table.insert(key.to_string(), KeyQueue::default());
                    None
                }
                Some(queue) => {
                    let (tx, rx) = oneshot::channel();
                    queue.waiting.push_back(tx);
                    tracing::trace!(key, position = queue.waiting.len(), "key contended, queued");
                    Some(rx)
                }
            }
        };

        if let Some(rx) = rx {
            PendingAcquire {
                manager: self,
                key,
                rx: Some(rx),
            }
            .wait()
            .await;
        }

        KeyGuard {
            manager: self,
            key: key.to_string(),
        }
    }

    /// Number of keys currently held or awaited
    pub fn tracked_keys(&self) -> usize {
        self.table.lock().len()
    }

    /// Number of contenders queued behind the holder of `key`
    pub fn queued(&self, key: &str) -> usize {
        self.table
            .lock()
            .get(key)
            .map(|queue| queue.waiting.len())
            .unwrap_or(0)
    }

    /// Pass ownership of `key` to the next live contender, or drop the entry
    fn release(&self, key: &str) {
        let mut table = self.table.lock();
        let Some(queue) = table.get_mut(key) else {
            return;
        };

        while let Some(next) = queue.waiting.pop_front() {
            // A failed send means that contender gave up while queued
            if next.send(()).is_ok() {
                tracing::trace!(key, "key handed to next contender");
                return;
            }
        }

        table.remove(key);
    }
}

impl Default for KeyLockManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive ownership of one key; releases on drop
pub struct KeyGuard<'a> {
    manager: &'a KeyLockManager,
    key: String,
}

impl KeyGuard<'_> {
    /// The key this guard owns
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.key);
    }
}

/// A queued contender
///
/// If dropped while still waiting, it either leaves the queue or, when the
/// handoff already happened, passes ownership on.
struct PendingAcquire<'a> {
    manager: &'a KeyLockManager,
    key: &'a str,
    rx: Option<oneshot::Receiver<()>>,
}

impl PendingAcquire<'_> {
    async fn wait(mut self) {
        if let Some(rx) = self.rx.as_mut() {
            // Senders are only consumed by release(), which always sends
            let _ = rx.await;
        }
        self.rx = None;
    }
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if rx.try_recv().is_ok() {
                self.manager.release(self.key);
            }
        }
    }
}
