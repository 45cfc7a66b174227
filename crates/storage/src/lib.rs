//! Store adapter abstraction for the clustered ticket registry.
//!
//! This crate provides the [`StorageBackend`] and [`Transaction`] traits that
//! the lease lock and the ticket store are written against, together with
//! the store clock and an in-process [`MemoryBackend`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Cleanup Scheduler                          │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │          LeaseLock           │        TicketRegistry        │
//! │      (leases/{name})         │        (tickets/{id})        │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                 ticket-registry-storage                     │
//! │     StorageBackend + Transaction + Clock (store time)       │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │ MemoryBackend│         relational adapter (deployment)      │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use ticket_registry_storage::{MemoryBackend, StorageBackend, Table};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MemoryBackend::new();
//!
//!     let mut txn = backend.transaction().await?;
//!     txn.compare_and_set(Table::Leases.key("cleaner"), None, b"node-a".to_vec())?;
//!     txn.commit().await?;
//!
//!     assert!(backend.get(&Table::Leases.key("cleaner")).await?.is_some());
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with shared test helpers.
//! - **`failpoints`**: Activates `fail` injection points in [`MemoryBackend`] (`memory-get`,
//!   `memory-range`, `memory-commit`) for exercising store-unavailable paths.

#![deny(unsafe_code)]

pub mod backend;
pub mod clock;
pub mod error;
pub mod memory;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod transaction;
pub mod types;

pub use backend::{StorageBackend, prefix_range};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use transaction::Transaction;
pub use types::{KeyValue, Table};
