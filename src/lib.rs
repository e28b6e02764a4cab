//! # jsonkv
//!
//! A per-key JSON document store served over HTTP, with:
//! - Per-key critical sections with FIFO fairness
//! - Shallow (`POST`) and recursive (`PATCH`) merge updates
//! - Long-polling for the next write to a key
//! - One file per document, replaced atomically
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Server                             │
//! │               (one task per connection)                      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Engine                                 │
//! │       fetch / replace / assign / patch / poll / watch        │
//! └──────┬──────────────────┬──────────────────┬────────────────┘
//!        │                  │                  │
//!        ▼                  ▼                  ▼
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Key Locks  │   │   Waiters    │   │    Merge     │
//! │ (FIFO/key)  │   │ (per key)    │   │  (pure fns)  │
//! └──────┬──────┘   └──────────────┘   └──────────────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ Byte Store  │
//! │ (key.json)  │
//! └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod merge;
pub mod lock;
pub mod notify;
pub mod storage;
pub mod engine;
pub mod protocol;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::Config;
pub use engine::{Engine, PollOutcome};
pub use merge::{merge_recursive, merge_replace, Document};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of jsonkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
