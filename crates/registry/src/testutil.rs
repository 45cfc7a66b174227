//! Shared test utilities for registry testing.
//!
//! Ticket fixtures, fixed test keys, pre-wired registries and lease locks,
//! and assertion macros for [`RegistryResult`] values. Feature-gated behind
//! `testutil` to keep it out of production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! ticket-registry = { path = "../registry", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use ticket_registry::testutil::{encrypted_registry, expiring_ticket};
//! ```

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use ticket_registry_storage::{ManualClock, MemoryBackend};

use crate::{
    catalog::TicketCatalog,
    cipher::{EncryptThenSignCipher, PayloadCipher},
    config::CipherConfig,
    error::{RegistryError, RegistryResult},
    lock::{LeaseLock, LeaseLockConfig},
    ticket::{DefaultTicketRegistry, ExpirationPolicy, Ticket},
};

/// AES-256 key used by every encrypted fixture.
pub const TEST_ENCRYPTION_KEY: [u8; 32] = [0x11; 32];

/// HMAC-SHA-512 key used by every encrypted fixture.
pub const TEST_SIGNING_KEY: [u8; 64] = [0x22; 64];

/// Instant `secs` seconds after the Unix epoch, the [`ManualClock`] default.
///
/// # Panics
///
/// Panics if `secs` is outside chrono's representable range.
#[must_use]
pub fn epoch_plus(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("timestamp in range")
}

/// A never-expiring ticket whose payload names its id.
#[must_use]
pub fn ticket(id: &str, ticket_type: &str) -> Ticket {
    Ticket::builder()
        .id(id)
        .ticket_type(ticket_type)
        .payload(Bytes::from(format!("payload:{id}")))
        .expiration(ExpirationPolicy::Never)
        .build()
}

/// A ticket that expires at `expires_at`.
#[must_use]
pub fn expiring_ticket(id: &str, ticket_type: &str, expires_at: DateTime<Utc>) -> Ticket {
    Ticket { expiration: ExpirationPolicy::absolute(expires_at), ..ticket(id, ticket_type) }
}

/// An [`EncryptThenSignCipher`] over the fixed test keys.
///
/// # Panics
///
/// Never with the fixed keys.
#[must_use]
pub fn test_cipher() -> Arc<dyn PayloadCipher> {
    Arc::new(
        EncryptThenSignCipher::new(&TEST_ENCRYPTION_KEY, &TEST_SIGNING_KEY)
            .expect("fixed test keys are valid"),
    )
}

/// An enabled [`CipherConfig`] carrying the fixed test keys as base64.
#[must_use]
pub fn encrypted_cipher_config() -> CipherConfig {
    CipherConfig::builder()
        .enabled(true)
        .encryption_key(STANDARD.encode(TEST_ENCRYPTION_KEY))
        .signing_key(STANDARD.encode(TEST_SIGNING_KEY))
        .build()
}

/// A plaintext registry over `backend` with the standard catalog.
#[must_use]
pub fn memory_registry(backend: MemoryBackend) -> DefaultTicketRegistry<MemoryBackend> {
    DefaultTicketRegistry::builder().backend(backend).catalog(TicketCatalog::standard()).build()
}

/// An encrypting registry over `backend` with the standard catalog.
#[must_use]
pub fn encrypted_registry(backend: MemoryBackend) -> DefaultTicketRegistry<MemoryBackend> {
    DefaultTicketRegistry::builder()
        .backend(backend)
        .catalog(TicketCatalog::standard())
        .cipher(test_cipher())
        .build()
}

/// A lease lock over `backend` whose local clock is `clock`, so the skew
/// check sees the same time as the store.
#[must_use]
pub fn lease_lock(backend: MemoryBackend, clock: &ManualClock) -> LeaseLock<MemoryBackend> {
    LeaseLock::new(backend, LeaseLockConfig::default()).with_local_clock(clock.clone())
}

/// Assert that a [`RegistryResult`] is a [`RegistryError::NotFound`].
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use ticket_registry::{RegistryError, RegistryResult, assert_ticket_not_found};
///
/// let result: RegistryResult<()> = Err(RegistryError::not_found("ST-1"));
/// assert_ticket_not_found!(result);
/// ```
#[macro_export]
macro_rules! assert_ticket_not_found {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::RegistryError::NotFound { .. })),
            "expected RegistryError::NotFound, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::RegistryError::NotFound { .. })),
            "{}: expected RegistryError::NotFound, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`RegistryResult`] failed payload verification.
#[macro_export]
macro_rules! assert_integrity_failure {
    ($result:expr) => {
        assert!(
            matches!(&$result, Err(err) if err.is_integrity_failure()),
            "expected an integrity failure, got: {:?}",
            $result,
        );
    };
}

/// Assert that a [`RegistryResult`] is `Ok` and return the value.
#[macro_export]
macro_rules! assert_registry_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got RegistryError: {e:?}"),
        }
    };
}

/// Returns `true` if the result is a store-unavailable error.
pub fn is_store_unavailable<T>(result: &RegistryResult<T>) -> bool {
    matches!(result, Err(RegistryError::StoreUnavailable(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::TicketRegistry;

    #[test]
    fn test_fixtures() {
        let t = expiring_ticket("ST-1", "ST", epoch_plus(10));
        assert_eq!(t.payload, Bytes::from_static(b"payload:ST-1"));
        assert!(t.is_expired(epoch_plus(10)));
        assert!(!ticket("TGT-1", "TGT").is_expired(epoch_plus(i64::from(i32::MAX))));
    }

    #[test]
    fn test_cipher_config_matches_test_cipher() {
        let from_config = encrypted_cipher_config().build().expect("valid config");
        let sealed = test_cipher().encode(b"abc").expect("encode");
        assert_eq!(from_config.decode(&sealed).expect("decode"), b"abc");
    }

    #[tokio::test]
    async fn test_macros() {
        let registry = encrypted_registry(MemoryBackend::new());
        assert_ticket_not_found!(registry.get("ST-404").await);
        assert_registry_ok!(registry.insert(&ticket("ST-1", "ST")).await);
        assert!(!is_store_unavailable(&registry.get("ST-1").await));
    }
}
