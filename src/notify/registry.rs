//! Notification Registry implementation

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::merge::Document;

use super::WaitOutcome;

/// One registered waiter as seen by the registry
struct Registration {
    id: u64,
    tx: oneshot::Sender<Document>,
}

/// Per-key lists of pending waiters
///
/// ## Concurrency:
/// - `waiters`: guarded by a parking_lot Mutex, never held across an await
/// - `next_id`: atomic counter identifying registrations for deregistration
pub struct NotificationRegistry {
    waiters: Mutex<HashMap<String, Vec<Registration>>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl NotificationRegistry {
    /// Create an empty registry whose waiters time out after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            timeout,
        }
    }

    /// Register a waiter for the next write to `key`
    ///
    /// Registration is complete when this returns; the returned [`Waiter`]
    /// only has to be awaited.
    pub fn wait(&self, key: &str) -> Waiter<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        self.waiters
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(Registration { id, tx });

        tracing::debug!(key, waiter = id, "waiter registered");

        Waiter {
            registry: self,
            key: key.to_string(),
            id,
            rx,
            timeout: self.timeout,
            resolved: false,
        }
    }

    /// Deliver `document` to every waiter of `key` and clear the list
    ///
    /// Returns how many waiters received it. With no waiters this is a no-op.
    pub fn notify(&self, key: &str, document: &Document) -> usize {
        let Some(registrations) = self.waiters.lock().remove(key) else {
            return 0;
        };

        let mut delivered = 0;
        for registration in registrations {
            // A failed send means the waiter was abandoned
            if registration.tx.send(document.clone()).is_ok() {
                delivered += 1;
            }
        }

        tracing::debug!(key, delivered, "waiters notified");
        delivered
    }

    /// Number of waiters currently registered for `key`
    pub fn pending(&self, key: &str) -> usize {
        self.waiters.lock().get(key).map(Vec::len).unwrap_or(0)
    }

    /// Number of keys with at least one registered waiter
    pub fn tracked_keys(&self) -> usize {
        self.waiters.lock().len()
    }

    /// The default waiter timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Remove one registration; false if a notify already claimed it
    fn deregister(&self, key: &str, id: u64) -> bool {
        let mut waiters = self.waiters.lock();
        let Some(registrations) = waiters.get_mut(key) else {
            return false;
        };

        let before = registrations.len();
        registrations.retain(|registration| registration.id != id);
        let removed = registrations.len() != before;

        if registrations.is_empty() {
            waiters.remove(key);
        }
        removed
    }
}

/// A registered, not yet resolved, long-poll waiter
///
/// Dropping an unresolved waiter deregisters it.
pub struct Waiter<'a> {
    registry: &'a NotificationRegistry,
    key: String,
    id: u64,
    rx: oneshot::Receiver<Document>,
    timeout: Duration,
    resolved: bool,
}

impl Waiter<'_> {
    /// Override the registry's default timeout for this waiter
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The key this waiter listens on
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next write or the timeout, whichever comes first
    pub async fn recv(mut self) -> WaitOutcome {
        let received = tokio::time::timeout(self.timeout, &mut self.rx).await;
        let outcome = match received {
            Ok(Ok(document)) => WaitOutcome::Updated(document),
            Ok(Err(_)) => WaitOutcome::TimedOut,
            Err(_) => {
                if self.registry.deregister(&self.key, self.id) {
                    tracing::debug!(key = %self.key, waiter = self.id, "waiter timed out");
                    WaitOutcome::TimedOut
                } else {
                    // A notify claimed us as the timer fired; its send is imminent
                    match (&mut self.rx).await {
                        Ok(document) => WaitOutcome::Updated(document),
                        Err(_) => WaitOutcome::TimedOut,
                    }
                }
            }
        };

        self.resolved = true;
        outcome
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.registry.deregister(&self.key, self.id) {
            tracing::debug!(key = %self.key, waiter = self.id, "abandoned waiter removed");
        }
    }
}
