//! Error types for jsonkv
//!
//! Provides a unified error type for all operations.
//!
//! A long-poll that expires is not an error: it resolves to
//! [`WaitOutcome::TimedOut`](crate::notify::WaitOutcome) instead.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for jsonkv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Document Errors
    // -------------------------------------------------------------------------
    #[error("Document not found: {key}")]
    NotFound { key: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Store failure: {0}")]
    StoreFailure(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// Shorthand for a NotFound error on `key`
    pub fn not_found(key: &str) -> Self {
        KvError::NotFound {
            key: key.to_string(),
        }
    }

    /// True for the NotFound variant
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound { .. })
    }
}

impl From<serde_json::Error> for KvError {
    fn from(err: serde_json::Error) -> Self {
        KvError::Serialization(err.to_string())
    }
}
