//! Concurrent access tests for `MemoryBackend` transactions.
//!
//! These exercise the conditional-write paths the lease lock and ticket
//! registry depend on: many tasks racing on one row must produce exactly one
//! winner per round, and nothing from a losing transaction may leak.

#![allow(clippy::expect_used, clippy::panic)]

use bytes::Bytes;
use ticket_registry_storage::{
    MemoryBackend, StorageBackend, StorageError, Table,
    testutil::{make_key, make_tagged_value},
};
use tokio::task::JoinSet;

/// Number of concurrent tasks for most tests.
const CONCURRENCY: usize = 16;

/// Number of contention rounds for the exactly-one-winner tests.
const CAS_ROUNDS: usize = 50;

// ---------------------------------------------------------------------------
// Test: transactional insert-if-absent: exactly one winner
// ---------------------------------------------------------------------------

/// Tasks race to create the same lease row through a transaction with an
/// insert-if-absent precondition. Exactly one commit may succeed.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transactional_insert_exactly_one_winner() {
    let backend = MemoryBackend::new();

    for round in 0..CAS_ROUNDS {
        let key = Table::Leases.key(&format!("race-{round}"));

        let mut set = JoinSet::new();
        for task_id in 0..CONCURRENCY {
            let backend = backend.clone();
            let key = key.clone();
            set.spawn(async move {
                let mut txn = backend.transaction().await?;
                txn.compare_and_set(key, None, format!("node-{task_id}").into_bytes())?;
                txn.commit().await
            });
        }

        let mut successes = 0usize;
        let mut conflicts = 0usize;
        while let Some(result) = set.join_next().await {
            match result.expect("task should not panic") {
                Ok(()) => successes += 1,
                Err(StorageError::Conflict) => conflicts += 1,
                Err(e) => panic!("unexpected error in round {round}: {e}"),
            }
        }

        assert_eq!(successes, 1, "round {round}: exactly one insert should succeed");
        assert_eq!(conflicts, CONCURRENCY - 1);
    }
}

// ---------------------------------------------------------------------------
// Test: read-then-conditional-write: exactly one winner
// ---------------------------------------------------------------------------

/// Each round seeds a row, then every task reads it inside a transaction and
/// conditionally replaces it. Only one replacement may commit, and the row
/// must end up holding the winner's value.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn read_modify_write_exactly_one_winner() {
    let backend = MemoryBackend::new();
    let key = Table::Leases.key("cleaner");

    for round in 0..CAS_ROUNDS {
        let seed = format!("round-{round}").into_bytes();
        backend.set(key.clone(), seed.clone()).await.expect("seed");

        let mut set = JoinSet::new();
        for task_id in 0..CONCURRENCY {
            let backend = backend.clone();
            let key = key.clone();
            set.spawn(async move {
                let mut txn = backend.transaction().await?;
                let seen = txn.get(&key).await?.map(|b| b.to_vec());
                let value = make_tagged_value(task_id, round);
                txn.compare_and_set(key, seen, value.clone())?;
                txn.commit().await.map(|()| value)
            });
        }

        let mut winners = Vec::new();
        while let Some(result) = set.join_next().await {
            match result.expect("task should not panic") {
                Ok(value) => winners.push(value),
                Err(StorageError::Conflict) => {},
                Err(e) => panic!("unexpected error in round {round}: {e}"),
            }
        }

        assert_eq!(winners.len(), 1, "round {round}: exactly one writer should commit");
        let stored = backend.get(&key).await.expect("get").expect("row present");
        assert_eq!(stored, Bytes::from(winners.remove(0)));
    }
}

// ---------------------------------------------------------------------------
// Test: conditional delete racing a conditional update
// ---------------------------------------------------------------------------

/// A sweeper deletes a row only if it still holds the bytes it scanned while
/// an updater replaces the same row. Whatever the interleaving, the row is
/// either deleted with the old bytes or present with the new bytes.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn conditional_delete_never_removes_updated_row() {
    let backend = MemoryBackend::new();

    for round in 0..CAS_ROUNDS {
        let key = make_key("tickets/ST", round);
        let old = b"old".to_vec();
        backend.set(key.clone(), old.clone()).await.expect("seed");

        let sweeper = {
            let backend = backend.clone();
            let key = key.clone();
            let old = old.clone();
            tokio::spawn(async move {
                let mut txn = backend.transaction().await?;
                txn.compare_and_delete(key, old)?;
                txn.commit().await
            })
        };
        let updater = {
            let backend = backend.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let mut txn = backend.transaction().await?;
                txn.compare_and_set(key, Some(old), b"new".to_vec())?;
                txn.commit().await
            })
        };

        let swept = sweeper.await.expect("sweeper panicked");
        let updated = updater.await.expect("updater panicked");
        let stored = backend.get(&key).await.expect("get");

        match (swept, updated) {
            (Ok(()), Err(StorageError::Conflict)) => assert_eq!(stored, None),
            (Err(StorageError::Conflict), Ok(())) => {
                assert_eq!(stored, Some(Bytes::from_static(b"new")));
            },
            other => panic!("round {round}: exactly one side must win, got {other:?}"),
        }
    }
}
