//! Notify Module
//!
//! Wait/notify registry backing long-poll requests.
//!
//! ## Responsibilities
//! - Register one-shot waiters against a key
//! - Broadcast the next written document to every waiter of that key
//! - Never buffer: a waiter only sees writes that happen after it registered
//! - Deregister waiters that time out or are abandoned
//!
//! Registration and notification for a key are both expected to happen inside
//! that key's critical section (see [`crate::lock`]), which linearizes them.

mod registry;

pub use registry::{NotificationRegistry, Waiter};

use crate::merge::Document;

/// How a waiter resolved
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// The document written by the next write to the key
    Updated(Document),

    /// No write arrived within the timeout
    TimedOut,
}

impl WaitOutcome {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, WaitOutcome::TimedOut)
    }

    /// The delivered document, if any
    pub fn into_document(self) -> Option<Document> {
        match self {
            WaitOutcome::Updated(document) => Some(document),
            WaitOutcome::TimedOut => None,
        }
    }
}
