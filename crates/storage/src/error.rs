//! Storage error types and result alias.
//!
//! This module defines the error types that can occur while talking to the
//! shared store. Every adapter maps its driver-level failures onto these
//! variants so the lease lock and the ticket registry can reason about them
//! uniformly.
//!
//! # Error Types
//!
//! - [`StorageError::NotFound`] - Row does not exist in the store
//! - [`StorageError::Conflict`] - Commit rejected because a conditional write lost a race
//! - [`StorageError::Connection`] - Transport or transaction-manager failure
//! - [`StorageError::Serialization`] - Row encoding/decoding failure
//! - [`StorageError::Internal`] - Adapter-specific internal error
//! - [`StorageError::Timeout`] - Operation exceeded the adapter's time limit
//!
//! # Example
//!
//! ```
//! use ticket_registry_storage::{StorageError, StorageResult};
//!
//! fn lookup(key: &str) -> StorageResult<Vec<u8>> {
//!     Err(StorageError::not_found(key))
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Errors preserve their source chain via the `#[source]` attribute, enabling
/// debugging tools to display the full error context.
///
/// # Non-exhaustive
///
/// New variants may be added without a semver-breaking change. Downstream
/// match expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested row was not found.
    #[error("Key not found: {key}")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// A compare-and-set or compare-and-delete precondition failed at commit.
    ///
    /// Nothing from the rejected transaction was applied.
    #[error("Transaction conflict")]
    Conflict,

    /// Connection or network error.
    ///
    /// The store could not be reached, or the transaction manager failed
    /// mid-commit. Callers treat this as "store unavailable".
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Serialization or deserialization error.
    ///
    /// A row could not be encoded for storage or decoded when read back. This
    /// typically indicates corruption or a schema mismatch.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Internal adapter error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Operation timed out.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `NotFound` error for the given key.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict() -> Self {
        Self::Conflict
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Returns `true` when a fresh attempt may succeed.
    ///
    /// Only transport failures and timeouts are transient. `Conflict` is not:
    /// it means another writer won, and the caller has to re-read before
    /// deciding anything.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}
