//! Transaction precondition, isolation and atomicity tests.
//!
//! Preconditions are compared against committed rows, never against the
//! transaction's own overlay. A failed precondition rejects the whole commit.
//! These tests run against `MemoryBackend`.

#![allow(clippy::expect_used, clippy::panic)]

use bytes::Bytes;
use ticket_registry_storage::{
    MemoryBackend, StorageBackend, StorageError, Table, assert_conflict, assert_storage_ok,
};

// ============================================================================
// Conflict Detection
// ============================================================================

/// Two transactions CAS the same lease row from the same prior value; the
/// second commit must be rejected.
#[tokio::test]
async fn test_two_transactions_same_key_cas_conflict() {
    let backend = MemoryBackend::new();
    let key = Table::Leases.key("cleaner");
    backend.set(key.clone(), b"node-a".to_vec()).await.expect("initial set");

    let mut txn_a = backend.transaction().await.expect("txn_a");
    txn_a.compare_and_set(key.clone(), Some(b"node-a".to_vec()), b"node-b".to_vec()).expect("buffer");

    let mut txn_b = backend.transaction().await.expect("txn_b");
    txn_b.compare_and_set(key.clone(), Some(b"node-a".to_vec()), b"node-c".to_vec()).expect("buffer");

    assert_storage_ok!(txn_a.commit().await);
    let result = txn_b.commit().await;
    assert_conflict!(result);

    assert_eq!(backend.get(&key).await.expect("get"), Some(Bytes::from("node-b")));
}

#[tokio::test]
async fn test_insert_if_absent_conflicts_with_existing_row() {
    let backend = MemoryBackend::new();
    let key = Table::Tickets.key("ST-1");
    backend.set(key.clone(), b"first".to_vec()).await.expect("set");

    let mut txn = backend.transaction().await.expect("txn");
    txn.compare_and_set(key.clone(), None, b"second".to_vec()).expect("buffer");
    let result = txn.commit().await;
    assert_conflict!(result);
    assert_eq!(backend.get(&key).await.expect("get"), Some(Bytes::from("first")));
}

#[tokio::test]
async fn test_compare_and_delete_requires_exact_bytes() {
    let backend = MemoryBackend::new();
    let key = Table::Leases.key("cleaner");
    backend.set(key.clone(), b"node-a@30".to_vec()).await.expect("set");

    let mut stale = backend.transaction().await.expect("txn");
    stale.compare_and_delete(key.clone(), b"node-a@20".to_vec()).expect("buffer");
    let result = stale.commit().await;
    assert_conflict!(result);
    assert!(backend.get(&key).await.expect("get").is_some());

    let mut exact = backend.transaction().await.expect("txn");
    exact.compare_and_delete(key.clone(), b"node-a@30".to_vec()).expect("buffer");
    assert_storage_ok!(exact.commit().await);
    assert!(backend.get(&key).await.expect("get").is_none());
}

#[tokio::test]
async fn test_compare_and_delete_of_missing_row_conflicts() {
    let backend = MemoryBackend::new();
    let mut txn = backend.transaction().await.expect("txn");
    txn.compare_and_delete(Table::Tickets.key("gone"), b"x".to_vec()).expect("buffer");
    let result = txn.commit().await;
    assert_conflict!(result);
}

// ============================================================================
// Atomicity
// ============================================================================

/// One stale precondition among many rejects every write in the batch,
/// including unconditional ones.
#[tokio::test]
async fn test_failed_precondition_applies_nothing() {
    let backend = MemoryBackend::new();
    for id in ["ST-1", "ST-2", "ST-3"] {
        backend.set(Table::Tickets.key(id), id.as_bytes().to_vec()).await.expect("set");
    }

    let mut txn = backend.transaction().await.expect("txn");
    txn.compare_and_delete(Table::Tickets.key("ST-1"), b"ST-1".to_vec()).expect("buffer");
    txn.compare_and_delete(Table::Tickets.key("ST-2"), b"stale".to_vec()).expect("buffer");
    txn.set(Table::Tickets.key("ST-4"), b"ST-4".to_vec());
    let result = txn.commit().await;
    assert_conflict!(result);

    assert_eq!(backend.len(), 3, "no write from a rejected commit may land");
    assert!(backend.get(&Table::Tickets.key("ST-4")).await.expect("get").is_none());
}

#[tokio::test]
async fn test_empty_transaction_commits() {
    let backend = MemoryBackend::new();
    let txn = backend.transaction().await.expect("txn");
    assert_storage_ok!(txn.commit().await);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_rollback_discards_writes() {
    let backend = MemoryBackend::new();
    let mut txn = backend.transaction().await.expect("txn");
    txn.set(b"k".to_vec(), b"v".to_vec());
    txn.rollback().await;
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_dropped_transaction_discards_writes() {
    let backend = MemoryBackend::new();
    {
        let mut txn = backend.transaction().await.expect("txn");
        txn.set(b"k".to_vec(), b"v".to_vec());
    }
    assert!(backend.is_empty());
}

// ============================================================================
// Isolation
// ============================================================================

#[tokio::test]
async fn test_read_your_writes() {
    let backend = MemoryBackend::new();
    backend.set(b"deleted".to_vec(), b"old".to_vec()).await.expect("set");

    let mut txn = backend.transaction().await.expect("txn");
    txn.set(b"written".to_vec(), b"new".to_vec());
    txn.delete(b"deleted".to_vec());

    assert_eq!(txn.get(b"written").await.expect("get"), Some(Bytes::from("new")));
    assert_eq!(txn.get(b"deleted").await.expect("get"), None);
    assert_eq!(backend.get(b"written").await.expect("get"), None, "not visible before commit");
}

/// A precondition is checked against the committed row even after the same
/// transaction has overwritten the key in its overlay.
#[tokio::test]
async fn test_precondition_ignores_own_overlay() {
    let backend = MemoryBackend::new();
    backend.set(b"k".to_vec(), b"committed".to_vec()).await.expect("set");

    let mut txn = backend.transaction().await.expect("txn");
    txn.set(b"k".to_vec(), b"overlay".to_vec());
    txn.compare_and_set(b"k".to_vec(), Some(b"committed".to_vec()), b"final".to_vec())
        .expect("buffer");
    assert_storage_ok!(txn.commit().await);
    assert_eq!(backend.get(b"k").await.expect("get"), Some(Bytes::from("final")));
}

#[tokio::test]
async fn test_read_committed_sees_concurrent_commit() {
    let backend = MemoryBackend::new();
    let txn = backend.transaction().await.expect("txn");

    backend.set(b"k".to_vec(), b"v".to_vec()).await.expect("set");
    assert_eq!(txn.get(b"k").await.expect("get"), Some(Bytes::from("v")));
}

#[tokio::test]
async fn test_direct_compare_and_set() {
    let backend = MemoryBackend::new();
    assert_storage_ok!(backend.compare_and_set(b"k", None, b"1".to_vec()).await);
    let result = backend.compare_and_set(b"k", None, b"2".to_vec()).await;
    assert!(matches!(result, Err(StorageError::Conflict)), "got {result:?}");
    assert_storage_ok!(backend.compare_and_set(b"k", Some(b"1".as_slice()), b"2".to_vec()).await);
    assert_eq!(backend.get(b"k").await.expect("get"), Some(Bytes::from("2")));
}
