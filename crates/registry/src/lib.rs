//! Cluster-shared ticket registry.
//!
//! Stateless authentication-server nodes persist short-lived tickets in one
//! shared store and elect, through a lease, the single node that sweeps
//! expired tickets.
//!
//! - [`LeaseLock`]: named, time-bounded exclusive leases decided against the store clock
//! - [`TicketRegistry`] / [`DefaultTicketRegistry`]: transactional ticket CRUD, expiry sweep and
//!   lazy listing
//! - [`PayloadCipher`]: optional encrypt-then-sign protection of stored payloads
//! - [`RegistryCleaner`]: the periodic sweep, gated by a [`LockingStrategy`]
//! - [`RegistryNode`]: wires all of the above from a [`RegistryConfig`]
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use chrono::Utc;
//! use ticket_registry::{
//!     ExpirationPolicy, RegistryConfig, RegistryNode, Ticket, TicketCatalog, TicketRegistry,
//! };
//! use ticket_registry_storage::MemoryBackend;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let backend = MemoryBackend::new();
//! let node = RegistryNode::new(backend, TicketCatalog::standard(), RegistryConfig::default())?;
//!
//! let ticket = Ticket::builder()
//!     .id("ST-1-abc")
//!     .ticket_type("ST")
//!     .payload(b"service=https://app.example.org".to_vec())
//!     .expiration(ExpirationPolicy::time_to_live(Utc::now(), Duration::from_secs(10)))
//!     .build();
//! node.registry().insert(&ticket).await?;
//! assert_eq!(node.registry().get("ST-1-abc").await?, ticket);
//! # Ok::<(), ticket_registry::RegistryError>(())
//! # }).unwrap();
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with fixtures and assertion macros.
//! - **`failpoints`**: Forwards to the storage crate's fail points so store outages can be
//!   injected under the registry.

#![deny(unsafe_code)]

pub mod catalog;
pub mod cipher;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod lock;
pub mod node;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod ticket;

pub use catalog::{TicketCatalog, TicketDefinition};
pub use cipher::{CipherError, EncryptThenSignCipher, NoOpCipher, PayloadCipher};
pub use cleaner::{CleanOutcome, CleanerHandle, RegistryCleaner};
pub use config::{CipherConfig, CleanerConfig, ConfigError, LockConfig, RegistryConfig};
pub use error::{RegistryError, RegistryResult};
pub use lock::{
    Lease, LeaseLock, LeaseLockConfig, LeaseLockingStrategy, LeaseResult, LockingStrategy,
    NoOpLockingStrategy,
};
pub use node::RegistryNode;
pub use ticket::{
    DefaultTicketRegistry, ExpirationPolicy, Ticket, TicketIter, TicketLockType, TicketRegistry,
    TypeFilter,
};
