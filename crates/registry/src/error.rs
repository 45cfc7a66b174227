//! Error types for registry operations.
//!
//! [`RegistryError`] is the single error surface of the ticket store, the
//! lease lock and the cleaner. Store failures keep the underlying
//! [`StorageError`] in the source chain so structured logs show the full
//! cause.

use std::time::Duration;

use thiserror::Error;
use ticket_registry_storage::StorageError;

use crate::{cipher::CipherError, config::ConfigError};

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// A ticket with this id is already stored.
    #[error("Ticket already exists: {id}")]
    DuplicateKey {
        /// The conflicting ticket id.
        id: String,
    },

    /// No ticket row exists for this id.
    #[error("Ticket not found: {id}")]
    NotFound {
        /// The missing ticket id.
        id: String,
    },

    /// The payload failed integrity verification or could not be decrypted.
    #[error("Payload integrity error: {0}")]
    Integrity(#[from] CipherError),

    /// The ticket type is not registered in the catalog.
    #[error("Unknown ticket type: {ticket_type}")]
    UnknownTicketType {
        /// The unrecognized type discriminator.
        ticket_type: String,
    },

    /// A lease was requested with a non-positive or unrepresentable duration.
    #[error("Invalid lease duration: {duration:?}")]
    InvalidLeaseDuration {
        /// The rejected duration.
        duration: Duration,
    },

    /// A conditional write kept losing to concurrent writers.
    #[error("Gave up on {key} after {attempts} conflicting attempts")]
    Contention {
        /// Storage key or lease name that was contended.
        key: String,
        /// Number of attempts made.
        attempts: usize,
    },

    /// The shared store failed or was unreachable.
    ///
    /// Wraps the original [`StorageError`] to preserve the source chain.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(
        /// The underlying storage error.
        #[source]
        StorageError,
    ),

    /// A stored row could not be decoded.
    #[error("Corrupt row {key}: {message}")]
    Serialization {
        /// Storage key of the offending row.
        key: String,
        /// Description of the decoding failure.
        message: String,
    },

    /// The registry configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RegistryError {
    /// Creates a [`RegistryError::NotFound`].
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a [`RegistryError::DuplicateKey`].
    #[must_use]
    pub fn duplicate_key(id: impl Into<String>) -> Self {
        Self::DuplicateKey { id: id.into() }
    }

    /// Creates a [`RegistryError::UnknownTicketType`].
    #[must_use]
    pub fn unknown_ticket_type(ticket_type: impl Into<String>) -> Self {
        Self::UnknownTicketType { ticket_type: ticket_type.into() }
    }

    /// Creates a [`RegistryError::Serialization`] for the row at `key`.
    #[must_use]
    pub fn serialization(key: &[u8], message: impl Into<String>) -> Self {
        Self::Serialization { key: String::from_utf8_lossy(key).into_owned(), message: message.into() }
    }

    /// Returns `true` if retrying the operation later may succeed.
    ///
    /// Store outages that the adapter reports as transient and lost
    /// conditional-write races are retryable; integrity failures, unknown
    /// types and duplicates are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StoreUnavailable(err) => err.is_transient(),
            Self::Contention { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` for payload tampering or decryption failures.
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::Integrity(CipherError::Integrity | CipherError::Decryption))
    }
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        Self::StoreUnavailable(err)
    }
}

/// Result type alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
