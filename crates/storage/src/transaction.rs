//! Transaction trait for atomic storage operations.
//!
//! Every read-modify-write the lease lock and ticket registry perform goes
//! through a [`Transaction`]. Writes are buffered and only reach the store on
//! [`commit`](Transaction::commit); conditional writes are checked at commit
//! time under the store's write lock.
//!
//! # Transaction Semantics
//!
//! - **Atomicity**: All operations in a transaction either apply together or not at all
//! - **Read-your-writes**: Reads within a transaction see pending writes
//! - **Rollback on every exit path**: A transaction dropped before `commit` (an early `?` return,
//!   a panic, a cancelled future) applies nothing
//!
//! # Example
//!
//! ```
//! use ticket_registry_storage::{MemoryBackend, StorageBackend};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let backend = MemoryBackend::new();
//! backend.set(b"leases/cleaner".to_vec(), b"node-a".to_vec()).await.unwrap();
//!
//! let mut txn = backend.transaction().await.unwrap();
//! let current = txn.get(b"leases/cleaner").await.unwrap().unwrap();
//! txn.compare_and_set(b"leases/cleaner".to_vec(), Some(current.to_vec()), b"node-b".to_vec())
//!     .unwrap();
//! txn.commit().await.unwrap();
//!
//! let holder = backend.get(b"leases/cleaner").await.unwrap().unwrap();
//! assert_eq!(&holder[..], b"node-b");
//! # });
//! ```

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Transaction handle for atomic multi-operation commits.
///
/// # Concurrency
///
/// Transactions use optimistic concurrency control. Plain `set` and `delete`
/// are blind writes; use [`compare_and_set`](Transaction::compare_and_set) or
/// [`compare_and_delete`](Transaction::compare_and_delete) to make the commit
/// depend on what was read. If any precondition fails the commit returns
/// [`StorageError::Conflict`](crate::StorageError::Conflict).
#[async_trait]
pub trait Transaction: Send {
    /// Gets a value within the transaction.
    ///
    /// Checks pending writes first, then falls back to the store.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the key exists
    /// - `Ok(None)` if the key doesn't exist or was deleted in this transaction
    /// - `Err(...)` on storage errors
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Buffers an unconditional set.
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// Buffers an unconditional delete.
    fn delete(&mut self, key: Vec<u8>);

    /// Buffers a compare-and-set.
    ///
    /// At commit the current value must equal `expected` byte for byte
    /// (`None` requires the key to be absent). Subsequent [`get`](Transaction::get)
    /// calls in this transaction observe `new_value`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the operation could not be buffered. A failed
    /// precondition surfaces from [`commit`](Transaction::commit).
    fn compare_and_set(
        &mut self,
        key: Vec<u8>,
        expected: Option<Vec<u8>>,
        new_value: Vec<u8>,
    ) -> StorageResult<()>;

    /// Buffers a conditional delete.
    ///
    /// At commit the current value must equal `expected` byte for byte,
    /// otherwise the whole transaction is rejected with
    /// [`Conflict`](crate::StorageError::Conflict). This is the affected-row
    /// check of `DELETE ... WHERE owner = ? AND expires_at = ?`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the operation could not be buffered.
    fn compare_and_delete(&mut self, key: Vec<u8>, expected: Vec<u8>) -> StorageResult<()>;

    /// Commits all buffered operations atomically.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`](crate::StorageError::Conflict) if a conditional write's
    ///   precondition no longer holds
    /// - Other [`StorageError`](crate::StorageError) variants on backend failures
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discards all buffered operations.
    ///
    /// Dropping the transaction has the same effect; this method exists so
    /// call sites can make the abort explicit.
    async fn rollback(self: Box<Self>) {
        drop(self);
    }
}
