//! Tests for Engine
//!
//! These tests verify:
//! - fetch / replace / assign / patch semantics
//! - Serialized read-modify-write per key (no lost updates)
//! - FIFO completion order per key
//! - Progress on other keys while one key is stalled
//! - Long-poll delivery, no buffering, and timeouts
//! - NotFound and StoreFailure leave storage and waiters untouched

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use jsonkv::config::Config;
use jsonkv::engine::{Engine, PollOutcome, Reply};
use jsonkv::protocol::Command;
use jsonkv::storage::{ByteStore, MemoryStore};
use jsonkv::{KvError, Result};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Test Stores
// =============================================================================

/// Memory store with injected latency and a log of persisted payloads
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
    puts: Mutex<Vec<(String, Bytes)>>,
}

impl SlowStore {
    fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            delay,
            puts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ByteStore for SlowStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.puts.lock().push((key.to_string(), data.clone()));
        self.inner.put(key, data).await
    }
}

/// Memory store whose writes can be switched to fail
struct FailingStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

#[async_trait]
impl ByteStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KvError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.put(key, data).await
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn config_with_timeout(ms: u64) -> Config {
    Config::builder().long_poll_timeout_ms(ms).build()
}

fn memory_engine(poll_timeout_ms: u64) -> (Arc<MemoryStore>, Engine) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::with_store(config_with_timeout(poll_timeout_ms), store.clone()).unwrap();
    (store, engine)
}

/// Yield until `count` waiters are registered on `key`
async fn wait_for_waiters(engine: &Engine, key: &str, count: usize) {
    for _ in 0..10_000 {
        if engine.registry().pending(key) >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("expected {} waiters on {:?}", count, key);
}

/// Yield until `count` operations are queued behind the holder of `key`
async fn wait_for_queue(engine: &Engine, key: &str, count: usize) {
    for _ in 0..10_000 {
        if engine.locks().queued(key) >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("expected {} queued operations on {:?}", count, key);
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[tokio::test]
async fn test_fetch_missing_is_not_found() {
    let (_store, engine) = memory_engine(1000);

    let result = engine.fetch("nope").await;
    assert!(matches!(result, Err(KvError::NotFound { ref key }) if key == "nope"));
}

#[tokio::test]
async fn test_replace_then_fetch() {
    let (_store, engine) = memory_engine(1000);

    engine.replace("doc", json!({"a": 1})).await.unwrap();
    assert_eq!(engine.fetch("doc").await.unwrap(), json!({"a": 1}));

    // Any JSON value is a legal document
    engine.replace("doc", json!([1, "two", null])).await.unwrap();
    assert_eq!(engine.fetch("doc").await.unwrap(), json!([1, "two", null]));
}

#[tokio::test]
async fn test_assign_overwrites_top_level_fields() {
    let (_store, engine) = memory_engine(1000);
    engine.replace("doc", json!({"a": 1, "b": {"x": 1}})).await.unwrap();

    let updated = engine.assign("doc", json!({"b": {"y": 2}, "c": 3})).await.unwrap();

    assert_eq!(updated, json!({"a": 1, "b": {"y": 2}, "c": 3}));
    assert_eq!(engine.fetch("doc").await.unwrap(), updated);
}

#[tokio::test]
async fn test_patch_merges_recursively() {
    let (_store, engine) = memory_engine(1000);
    engine
        .replace("doc", json!({"a": {"x": 1, "y": 2}, "list": [1, 2]}))
        .await
        .unwrap();

    let updated = engine
        .patch("doc", json!({"a": {"y": 3, "z": 4}, "list": [9]}))
        .await
        .unwrap();

    assert_eq!(updated, json!({"a": {"x": 1, "y": 3, "z": 4}, "list": [9]}));
    assert_eq!(engine.fetch("doc").await.unwrap(), updated);
}

#[tokio::test]
async fn test_empty_key_is_rejected() {
    let (store, engine) = memory_engine(1000);

    let result = engine.replace("", json!(1)).await;
    assert!(matches!(result, Err(KvError::InvalidKey(_))));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_corrupt_stored_bytes_is_serialization_error() {
    let (store, engine) = memory_engine(1000);
    store.put("doc", Bytes::from_static(b"{not json")).await.unwrap();

    let result = engine.fetch("doc").await;
    assert!(matches!(result, Err(KvError::Serialization(_))));
    assert_eq!(engine.locks().tracked_keys(), 0);
}

#[tokio::test]
async fn test_execute_routes_commands() {
    let (_store, engine) = memory_engine(1000);

    let reply = engine
        .execute(Command::Replace {
            key: "doc".to_string(),
            document: json!({"a": 1}),
        })
        .await
        .unwrap();
    assert_eq!(reply, Reply::Written);

    let reply = engine
        .execute(Command::Patch {
            key: "doc".to_string(),
            partial: json!({"b": 2}),
        })
        .await
        .unwrap();
    assert_eq!(reply, Reply::Written);

    let reply = engine
        .execute(Command::Fetch {
            key: "doc".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(reply, Reply::Document(json!({"a": 1, "b": 2})));
}

#[test]
fn test_registry_uses_configured_poll_timeout() {
    let (_store, engine) = memory_engine(1234);

    assert_eq!(engine.config().long_poll_timeout_ms, 1234);
    assert_eq!(engine.registry().timeout(), Duration::from_millis(1234));
}

#[test]
fn test_zero_poll_timeout_is_config_error() {
    let result = Engine::with_store(config_with_timeout(0), Arc::new(MemoryStore::new()));
    assert!(matches!(result, Err(KvError::Config(_))));
}

#[tokio::test]
async fn test_file_backed_engine_persists_across_open() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().data_dir(temp_dir.path()).build();

    {
        let engine = Engine::open(config.clone()).unwrap();
        engine.replace("doc", json!({"a": 1})).await.unwrap();
        engine.patch("doc", json!({"b": {"c": 2}})).await.unwrap();
    }

    assert!(temp_dir.path().join("doc.json").exists());
    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.fetch("doc").await.unwrap(), json!({"a": 1, "b": {"c": 2}}));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_are_not_lost() {
    let store = Arc::new(SlowStore::new(Duration::from_millis(2)));
    let engine = Arc::new(Engine::with_store(config_with_timeout(1000), store).unwrap());
    engine.replace("doc", json!({})).await.unwrap();

    let mut handles = vec![];
    for i in 0..20 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let field = format!("field{}", i);
            engine.assign("doc", json!({ field: i })).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let document = engine.fetch("doc").await.unwrap();
    let fields = document.as_object().unwrap();
    assert_eq!(fields.len(), 20);
    for i in 0..20 {
        assert_eq!(fields[&format!("field{}", i)], json!(i));
    }
    assert_eq!(engine.locks().tracked_keys(), 0);
}

#[tokio::test]
async fn test_writes_complete_in_arrival_order() {
    let store = Arc::new(SlowStore::new(Duration::from_millis(1)));
    let engine = Arc::new(Engine::with_store(config_with_timeout(1000), store.clone()).unwrap());
    engine.replace("doc", json!({"log": []})).await.unwrap();

    let holder = engine.locks().acquire("doc").await;

    let mut handles = vec![];
    for i in 1..=5 {
        let engine_clone = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine_clone.assign("doc", json!({ "last": i })).await.unwrap();
        }));
        wait_for_queue(&engine, "doc", i).await;
    }

    drop(holder);
    for handle in handles {
        handle.await.unwrap();
    }

    let written: Vec<serde_json::Value> = store
        .puts
        .lock()
        .iter()
        .skip(1)
        .map(|(_, data)| serde_json::from_slice::<serde_json::Value>(data).unwrap()["last"].clone())
        .collect();
    assert_eq!(written, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
}

#[tokio::test]
async fn test_stalled_key_does_not_block_others() {
    let (_store, engine) = memory_engine(1000);

    let _stalled = engine.locks().acquire("a").await;

    let result = tokio::time::timeout(Duration::from_secs(1), async {
        engine.replace("b", json!(1)).await?;
        engine.fetch("b").await
    })
    .await;

    assert_eq!(result.unwrap().unwrap(), json!(1));
}

// =============================================================================
// Long-poll Tests
// =============================================================================

#[tokio::test]
async fn test_poll_existing_document_is_ready() {
    let (_store, engine) = memory_engine(1000);
    engine.replace("doc", json!({"a": 1})).await.unwrap();

    let outcome = engine.poll("doc").await.unwrap();

    assert_eq!(outcome, PollOutcome::Ready(json!({"a": 1})));
    assert_eq!(engine.registry().tracked_keys(), 0);
}

#[tokio::test]
async fn test_poll_missing_document_waits_for_write() {
    let (_store, engine) = memory_engine(5000);

    let (outcome, _) = tokio::join!(engine.poll("doc"), async {
        wait_for_waiters(&engine, "doc", 1).await;
        engine.replace("doc", json!({"created": true})).await.unwrap();
    });

    assert_eq!(outcome.unwrap(), PollOutcome::Updated(json!({"created": true})));
}

#[tokio::test]
async fn test_watch_receives_next_write_result() {
    let (_store, engine) = memory_engine(5000);
    engine.replace("doc", json!({"a": {"x": 1}})).await.unwrap();

    let (first, second, _) = tokio::join!(engine.watch("doc"), engine.watch("doc"), async {
        wait_for_waiters(&engine, "doc", 2).await;
        engine.patch("doc", json!({"a": {"y": 2}})).await.unwrap();
    });

    let expected = json!({"a": {"x": 1, "y": 2}});
    assert_eq!(first.unwrap(), PollOutcome::Updated(expected.clone()));
    assert_eq!(second.unwrap(), PollOutcome::Updated(expected));
}

#[tokio::test]
async fn test_watch_after_write_sees_only_later_write() {
    let (_store, engine) = memory_engine(5000);
    engine.replace("doc", json!(1)).await.unwrap();

    let (outcome, _) = tokio::join!(engine.watch("doc"), async {
        wait_for_waiters(&engine, "doc", 1).await;
        engine.replace("doc", json!(2)).await.unwrap();
        engine.replace("doc", json!(3)).await.unwrap();
    });

    assert_eq!(outcome.unwrap(), PollOutcome::Updated(json!(2)));
}

#[tokio::test]
async fn test_poll_timeout_leaves_no_waiter() {
    let (_store, engine) = memory_engine(30);

    let outcome = engine.poll("doc").await.unwrap();
    assert_eq!(outcome, PollOutcome::TimedOut);
    assert_eq!(engine.registry().pending("doc"), 0);
    assert_eq!(engine.registry().tracked_keys(), 0);
    assert_eq!(engine.locks().tracked_keys(), 0);

    // A later write finds nobody to deliver to
    engine.replace("doc", json!(1)).await.unwrap();
    assert_eq!(engine.registry().notify("doc", &json!(1)), 0);
}

#[tokio::test]
async fn test_pending_poll_does_not_block_writes() {
    let (_store, engine) = memory_engine(5000);

    let (outcome, write) = tokio::join!(engine.watch("doc"), async {
        wait_for_waiters(&engine, "doc", 1).await;
        tokio::time::timeout(Duration::from_secs(1), engine.replace("doc", json!("x"))).await
    });

    assert!(write.unwrap().is_ok());
    assert_eq!(outcome.unwrap(), PollOutcome::Updated(json!("x")));
}

// =============================================================================
// Failure Tests
// =============================================================================

#[tokio::test]
async fn test_update_missing_is_not_found_and_writes_nothing() {
    let (store, engine) = memory_engine(5000);
    let waiter = engine.registry().wait("doc");

    let assign = engine.assign("doc", json!({"a": 1})).await;
    let patch = engine.patch("doc", json!({"a": 1})).await;

    assert!(matches!(assign, Err(KvError::NotFound { .. })));
    assert!(matches!(patch, Err(KvError::NotFound { .. })));
    assert!(!store.contains("doc"));
    assert_eq!(engine.registry().pending("doc"), 1);
    assert_eq!(engine.locks().tracked_keys(), 0);
    drop(waiter);
}

#[tokio::test]
async fn test_store_failure_skips_notify_and_releases_lock() {
    let store = Arc::new(FailingStore {
        inner: MemoryStore::new(),
        fail_writes: AtomicBool::new(false),
    });
    let engine = Engine::with_store(config_with_timeout(5000), store.clone()).unwrap();
    engine.replace("doc", json!({"a": 1})).await.unwrap();

    store.fail_writes.store(true, Ordering::SeqCst);
    let waiter = engine.registry().wait("doc");

    let replace = engine.replace("doc", json!({"a": 2})).await;
    let patch = engine.patch("doc", json!({"b": 2})).await;

    assert!(matches!(replace, Err(KvError::StoreFailure(_))));
    assert!(matches!(patch, Err(KvError::StoreFailure(_))));
    assert_eq!(engine.registry().pending("doc"), 1);
    assert_eq!(engine.locks().tracked_keys(), 0);

    // The stored document is unchanged and the key is still usable
    store.fail_writes.store(false, Ordering::SeqCst);
    assert_eq!(engine.fetch("doc").await.unwrap(), json!({"a": 1}));
    engine.patch("doc", json!({"b": 3})).await.unwrap();
    assert_eq!(
        waiter.recv().await.into_document(),
        Some(json!({"a": 1, "b": 3}))
    );
}
