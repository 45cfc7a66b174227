//! Cluster-wide exclusive leases.
//!
//! [`LeaseLock`] is the primitive: a named row in the `leases` table whose
//! owner and expiry are changed only through a conditional write in a single
//! store transaction. [`LockingStrategy`] is what the cleanup scheduler holds:
//! a lease bound to one name, owner and timeout, or a no-op for single-node
//! deployments.
//!
//! # Lease lifecycle
//!
//! ```text
//!            acquire (absent)               acquire (same owner)
//!   none ───────────────────────▶ held ◀─────────────────────────┐
//!    ▲                             │  └──────────────────────────┘
//!    │ release (holder)            │ store clock reaches expires_at
//!    └─────────────────────────────┤
//!                                  ▼
//!                               lapsed ── acquire (any owner) ──▶ held
//! ```

mod lease;
mod strategy;

pub use self::{
    lease::{Lease, LeaseLock, LeaseLockConfig, LeaseResult},
    strategy::{LeaseLockingStrategy, LockingStrategy, NoOpLockingStrategy},
};
