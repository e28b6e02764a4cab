//! Tests for the byte stores
//!
//! These tests verify:
//! - FileStore get/put round trips through `{key}.json` files
//! - Missing keys read as `None`
//! - Overwrites leave no temp files behind
//! - Keys that would escape the directory are rejected
//! - MemoryStore behaves the same way through the trait

use bytes::Bytes;
use jsonkv::storage::{validate_key, ByteStore, FileStore, MemoryStore};
use jsonkv::KvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_file_store() -> (TempDir, FileStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::open(temp_dir.path()).unwrap();
    (temp_dir, store)
}

fn file_names(temp_dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Key Validation Tests
// =============================================================================

#[test]
fn test_validate_key_accepts_plain_keys() {
    assert!(validate_key("profile").is_ok());
    assert!(validate_key("user-42_settings.v2").is_ok());
    assert!(validate_key("with space").is_ok());
}

#[test]
fn test_validate_key_rejects_unsafe_keys() {
    for key in ["", ".hidden", "..", "a/b", "a\\b", "nul\0byte"] {
        assert!(
            matches!(validate_key(key), Err(KvError::InvalidKey(_))),
            "key {:?} should be rejected",
            key
        );
    }
}

// =============================================================================
// FileStore Tests
// =============================================================================

#[test]
fn test_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("docs");

    let store = FileStore::open(&path).unwrap();

    assert!(path.is_dir());
    assert_eq!(store.root(), path.as_path());
}

#[tokio::test]
async fn test_file_store_put_get() {
    let (temp_dir, store) = setup_file_store();

    store.put("doc", Bytes::from_static(b"{\"a\":1}")).await.unwrap();

    let data = store.get("doc").await.unwrap();
    assert_eq!(data, Some(Bytes::from_static(b"{\"a\":1}")));
    assert_eq!(file_names(&temp_dir), vec!["doc.json".to_string()]);
}

#[tokio::test]
async fn test_file_store_missing_key_is_none() {
    let (_temp, store) = setup_file_store();

    assert_eq!(store.get("absent").await.unwrap(), None);
}

#[tokio::test]
async fn test_file_store_overwrite_leaves_no_temp_files() {
    let (temp_dir, store) = setup_file_store();

    for i in 0..5 {
        let payload = format!("{{\"n\":{}}}", i);
        store.put("doc", Bytes::from(payload)).await.unwrap();
    }

    assert_eq!(
        store.get("doc").await.unwrap(),
        Some(Bytes::from_static(b"{\"n\":4}"))
    );
    assert_eq!(file_names(&temp_dir), vec!["doc.json".to_string()]);
}

#[tokio::test]
async fn test_file_store_path_layout() {
    let (temp_dir, store) = setup_file_store();

    let path = store.path_for("settings").unwrap();
    assert_eq!(path, temp_dir.path().join("settings.json"));
}

#[tokio::test]
async fn test_file_store_rejects_traversal() {
    let (_temp, store) = setup_file_store();

    let result = store.put("../escape", Bytes::from_static(b"{}")).await;
    assert!(matches!(result, Err(KvError::InvalidKey(_))));

    let result = store.get("../escape").await;
    assert!(matches!(result, Err(KvError::InvalidKey(_))));
}

#[tokio::test]
async fn test_file_store_put_into_missing_directory_is_store_failure() {
    let (temp_dir, store) = setup_file_store();
    std::fs::remove_dir_all(temp_dir.path()).unwrap();

    let result = store.put("doc", Bytes::from_static(b"{}")).await;
    assert!(matches!(result, Err(KvError::StoreFailure(_))));
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.put("doc", Bytes::from_static(b"[1,2,3]")).await.unwrap();
    }

    let reopened = FileStore::open(temp_dir.path()).unwrap();
    assert_eq!(
        reopened.get("doc").await.unwrap(),
        Some(Bytes::from_static(b"[1,2,3]"))
    );
}

// =============================================================================
// MemoryStore Tests
// =============================================================================

#[tokio::test]
async fn test_memory_store_through_trait_object() {
    let store: Box<dyn ByteStore> = Box::new(MemoryStore::new());

    assert_eq!(store.get("doc").await.unwrap(), None);
    store.put("doc", Bytes::from_static(b"true")).await.unwrap();
    assert_eq!(store.get("doc").await.unwrap(), Some(Bytes::from_static(b"true")));
}

#[tokio::test]
async fn test_memory_store_accounting() {
    let store = MemoryStore::new();
    assert!(store.is_empty());

    store.put("a", Bytes::from_static(b"1")).await.unwrap();
    store.put("b", Bytes::from_static(b"2")).await.unwrap();
    store.put("a", Bytes::from_static(b"3")).await.unwrap();

    assert_eq!(store.len(), 2);
    assert!(store.contains("a"));
    assert!(!store.contains("c"));
}

#[tokio::test]
async fn test_memory_store_rejects_empty_key() {
    let store = MemoryStore::new();

    let result = store.put("", Bytes::from_static(b"1")).await;
    assert!(matches!(result, Err(KvError::InvalidKey(_))));
}
