//! Lock Module
//!
//! Per-key exclusive critical sections.
//!
//! ## Responsibilities
//! - At most one critical section per key at any instant
//! - FIFO handoff between contenders for the same key
//! - No coordination at all between distinct keys
//! - Release on success, error, panic, or cancellation of the holder
//!
//! ## Data Structure Choice
//! A single `HashMap<String, KeyQueue>` behind a parking_lot Mutex:
//! - An entry exists exactly while the key is held
//! - Its queue holds one oneshot sender per waiting contender
//! - Release hands ownership directly to the queue head, so a late arrival
//!   can never overtake a queued one
//! - The table mutex is held only for map updates, never across an await

mod manager;

pub use manager::{KeyGuard, KeyLockManager};
