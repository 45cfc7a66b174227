//! Storage backend trait definition.
//!
//! This module defines the [`StorageBackend`] trait, the store adapter the
//! lease lock and the ticket registry are built on. A relational deployment
//! implements it over two tables; the in-process [`MemoryBackend`](crate::MemoryBackend)
//! implements it over an ordered map.
//!
//! # Design
//!
//! - **Rows are bytes**: keys are `table/primary-key`, values are the encoded row
//! - **Async by default**: all I/O is async so a slow store never blocks the runtime
//! - **Transactional**: read-modify-write goes through [`Transaction`], with conditional writes
//!   checked at commit
//! - **One clock**: [`now`](StorageBackend::now) is the store-observed timestamp every expiry
//!   decision is made against
//!
//! Domain logic (what a lease or a ticket row means) lives in the registry
//! crate, not in backends.
//!
//! # Implementing a Backend
//!
//! 1. Implement the [`StorageBackend`] trait
//! 2. Implement a corresponding [`Transaction`] type
//! 3. Map driver errors to [`StorageError`](crate::StorageError)

use std::ops::{Bound, RangeBounds};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{error::StorageResult, transaction::Transaction, types::KeyValue};

/// Abstract store adapter.
///
/// Backends are expected to be thread-safe (`Send + Sync`) and support
/// concurrent operations from many tasks and many nodes.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageBackend::get) | Read a single row |
/// | [`set`](StorageBackend::set) | Write a row unconditionally |
/// | [`compare_and_set`](StorageBackend::compare_and_set) | Atomic compare-and-swap |
/// | [`delete`](StorageBackend::delete) | Remove a row |
/// | [`get_range`](StorageBackend::get_range) | Read rows in key order |
/// | [`clear_range`](StorageBackend::clear_range) | Delete rows in a key range |
/// | [`transaction`](StorageBackend::transaction) | Begin an atomic transaction |
/// | [`now`](StorageBackend::now) | Store-observed current timestamp |
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use ticket_registry_storage::{MemoryBackend, StorageBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// backend.set(b"tickets/ST-1".to_vec(), b"row".to_vec()).await.unwrap();
/// let value = backend.get(b"tickets/ST-1").await.unwrap();
/// assert_eq!(value, Some(Bytes::from("row")));
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a row by key.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the key exists
    /// - `Ok(None)` if the key doesn't exist
    /// - `Err(...)` on storage errors
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Stores a row, overwriting any existing value.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()>;

    /// Atomically sets a row if it matches the expected current value.
    ///
    /// - **`expected: None`**: insert-if-absent. Fails with
    ///   [`Conflict`](crate::StorageError::Conflict) if any value is present.
    /// - **`expected: Some(value)`**: update-if-unchanged. Fails with
    ///   [`Conflict`](crate::StorageError::Conflict) if the row is absent or holds different bytes.
    ///
    /// The comparison is exact, length-sensitive byte equality.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`](crate::StorageError::Conflict): the precondition failed.
    #[must_use = "compare-and-set may fail with a conflict and errors must be handled"]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()>;

    /// Deletes a row. Deleting an absent row is a no-op.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Retrieves all rows within a key range, in key order.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send;

    /// Deletes all rows within a key range and returns how many were removed.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn clear_range<R>(&self, range: R) -> StorageResult<usize>
    where
        R: RangeBounds<Vec<u8>> + Send;

    /// Begins a new transaction.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn transaction(&self) -> StorageResult<Box<dyn Transaction>>;

    /// Returns the store-observed current timestamp.
    fn now(&self) -> DateTime<Utc>;
}

/// Returns the key range covering every key that starts with `prefix`.
///
/// `prefix_range(b"tickets/")` is the whole `tickets` table.
#[must_use]
pub fn prefix_range(prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let start = Bound::Included(prefix.to_vec());
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return (start, Bound::Excluded(end));
        }
    }
    (start, Bound::Unbounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_range_bounds() {
        let range = prefix_range(b"tickets/");
        assert_eq!(range.0, Bound::Included(b"tickets/".to_vec()));
        assert_eq!(range.1, Bound::Excluded(b"tickets0".to_vec()));
        assert!(range.contains(&b"tickets/TGT-1".to_vec()));
        assert!(!range.contains(&b"leases/x".to_vec()));
    }

    #[test]
    fn test_prefix_range_trailing_max_byte() {
        let range = prefix_range(&[b'a', u8::MAX]);
        assert_eq!(range.1, Bound::Excluded(b"b".to_vec()));

        let range = prefix_range(&[u8::MAX, u8::MAX]);
        assert_eq!(range.1, Bound::Unbounded);
    }
}
