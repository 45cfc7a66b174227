//! In-memory storage backend implementation.
//!
//! This module provides [`MemoryBackend`], an in-process implementation of
//! [`StorageBackend`] suitable for tests, development and single-node
//! deployments.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: Rows live in a [`BTreeMap`] so table scans are range queries
//! - **Transactions**: Buffered writes with read-your-writes; conditional writes are checked under
//!   the write lock at commit
//! - **Injectable clock**: [`now`](StorageBackend::now) comes from a [`Clock`], so tests can drive
//!   lease and ticket expiry deterministically
//!
//! # Example
//!
//! ```
//! use ticket_registry_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set(b"tickets/TGT-1".to_vec(), b"row".to_vec()).await.unwrap();
//!     let value = backend.get(b"tickets/TGT-1").await.unwrap();
//!
//!     assert_eq!(value.unwrap().as_ref(), b"row");
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - Sharing across nodes requires sharing the same process, so this backend only gives cluster
//!   semantics inside tests

use std::{
    collections::BTreeMap,
    ops::{Bound, RangeBounds},
    sync::Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    backend::StorageBackend,
    clock::{Clock, SystemClock},
    error::{StorageError, StorageResult},
    transaction::Transaction,
    types::KeyValue,
};

/// In-memory storage backend using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying rows and clock, which is how tests model several nodes
/// talking to one store.
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Bytes>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    /// Creates an empty backend that reports wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Creates an empty backend whose [`now`](StorageBackend::now) is read
    /// from `clock`.
    ///
    /// ```
    /// use chrono::Duration;
    /// use ticket_registry_storage::{ManualClock, MemoryBackend, StorageBackend};
    ///
    /// let clock = ManualClock::default();
    /// let backend = MemoryBackend::with_clock(clock.clone());
    /// clock.advance(Duration::seconds(30));
    /// assert_eq!(backend.now().timestamp(), 30);
    /// ```
    #[must_use]
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self { data: Arc::new(RwLock::new(BTreeMap::new())), clock: Arc::new(clock) }
    }

    /// Returns the number of rows currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` when the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn borrowed_bounds<R: RangeBounds<Vec<u8>>>(range: &R) -> (Bound<&[u8]>, Bound<&[u8]>) {
    let start = match range.start_bound() {
        Bound::Included(b) => Bound::Included(b.as_slice()),
        Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    };

    let end = match range.end_bound() {
        Bound::Included(b) => Bound::Included(b.as_slice()),
        Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    };

    (start, end)
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[tracing::instrument(skip_all, fields(key_len = key.len()))]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        fail_point!("memory-get", |_| {
            Err(StorageError::connection("injected failure on read"))
        });

        let data = self.data.read();
        Ok(data.get(key).cloned())
    }

    #[tracing::instrument(skip_all, fields(key_len = key.len(), value_len = value.len()))]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        let mut data = self.data.write();
        data.insert(key, Bytes::from(value));
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(key_len = key.len()))]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        let mut data = self.data.write();

        let matches = match (expected, data.get(key)) {
            (None, None) => true,
            (Some(exp), Some(cur)) => exp == &cur[..],
            _ => false,
        };

        if !matches {
            return Err(StorageError::Conflict);
        }

        data.insert(key.to_vec(), Bytes::from(new_value));
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(key_len = key.len()))]
    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let mut data = self.data.write();
        data.remove(key);
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        fail_point!("memory-range", |_| {
            Err(StorageError::connection("injected failure on range scan"))
        });

        let data = self.data.read();
        let results: Vec<KeyValue> = data
            .range::<[u8], _>(borrowed_bounds(&range))
            .map(|(k, v)| KeyValue::new(Bytes::copy_from_slice(k), v.clone()))
            .collect();

        Ok(results)
    }

    #[tracing::instrument(skip_all)]
    async fn clear_range<R>(&self, range: R) -> StorageResult<usize>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        let mut data = self.data.write();
        let keys_to_remove: Vec<Vec<u8>> =
            data.range::<[u8], _>(borrowed_bounds(&range)).map(|(k, _)| k.clone()).collect();

        for key in &keys_to_remove {
            data.remove(key);
        }

        Ok(keys_to_remove.len())
    }

    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction::new(self.clone())))
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// A precondition verified at commit time.
#[derive(Debug, Clone)]
struct Precondition {
    key: Vec<u8>,
    /// `None` requires the row to be absent.
    expected: Option<Vec<u8>>,
}

/// In-memory transaction implementation.
///
/// `pending_writes` is the overlay of final row states (`None` = deleted);
/// `preconditions` are compared against committed rows, not the overlay.
struct MemoryTransaction {
    backend: MemoryBackend,
    pending_writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    preconditions: Vec<Precondition>,
}

impl MemoryTransaction {
    fn new(backend: MemoryBackend) -> Self {
        Self { backend, pending_writes: BTreeMap::new(), preconditions: Vec::new() }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        if let Some(value) = self.pending_writes.get(key) {
            return Ok(value.as_ref().map(|v| Bytes::copy_from_slice(v)));
        }

        self.backend.get(key).await
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.pending_writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.pending_writes.insert(key, None);
    }

    fn compare_and_set(
        &mut self,
        key: Vec<u8>,
        expected: Option<Vec<u8>>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        self.preconditions.push(Precondition { key: key.clone(), expected });
        self.pending_writes.insert(key, Some(new_value));
        Ok(())
    }

    fn compare_and_delete(&mut self, key: Vec<u8>, expected: Vec<u8>) -> StorageResult<()> {
        self.preconditions.push(Precondition { key: key.clone(), expected: Some(expected) });
        self.pending_writes.insert(key, None);
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(
        writes = self.pending_writes.len(),
        preconditions = self.preconditions.len(),
    ))]
    async fn commit(self: Box<Self>) -> StorageResult<()> {
        fail_point!("memory-commit", |_| {
            Err(StorageError::connection("injected failure on commit"))
        });

        let mut data = self.backend.data.write();

        for precondition in &self.preconditions {
            let matches = match (&precondition.expected, data.get(&precondition.key)) {
                (None, None) => true,
                (Some(expected), Some(current)) => expected.as_slice() == &current[..],
                _ => false,
            };

            if !matches {
                return Err(StorageError::Conflict);
            }
        }

        for (key, value) in self.pending_writes {
            match value {
                Some(v) => {
                    data.insert(key, Bytes::from(v));
                },
                None => {
                    data.remove(&key);
                },
            }
        }

        Ok(())
    }
}
