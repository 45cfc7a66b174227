//! Registry configuration.
//!
//! [`RegistryConfig`] is an explicit value handed to
//! [`RegistryNode::new`](crate::RegistryNode::new); nothing reads process-wide
//! settings except the host identity fallback in [`RegistryConfig::owner_id`].
//!
//! Durations are written in humantime form (`"1h"`, `"15s"`):
//!
//! ```
//! use std::time::Duration;
//!
//! use ticket_registry::RegistryConfig;
//!
//! let config: RegistryConfig = serde_json::from_str(
//!     r#"{ "host_name": "cas-1", "lock": { "timeout": "90s" } }"#,
//! )?;
//! config.validate()?;
//!
//! assert_eq!(config.lock.timeout, Duration::from_secs(90));
//! assert_eq!(config.cleaner_interval(), Duration::from_secs(30));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{fmt, sync::Arc, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::{
    cipher::{CipherError, EncryptThenSignCipher, NoOpCipher, PayloadCipher},
    lock::LeaseLockConfig,
    ticket::TicketLockType,
};

/// Lease name the cleanup scheduler locks on.
pub const DEFAULT_LOCK_NAME: &str = "cas-ticket-registry-cleaner";

/// Default lease timeout (1 hour).
pub(crate) const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default tolerated clock disagreement between nodes and the store.
pub(crate) const DEFAULT_SKEW_TOLERANCE: Duration = Duration::from_secs(5);

/// Default bound on immediate retries after a lost commit race.
pub const DEFAULT_MAX_CONFLICT_RETRIES: usize = 3;

/// Default delay before the first cleanup cycle.
const DEFAULT_START_DELAY: Duration = Duration::from_secs(15);

/// Shortest lease renewal cadence, used when a third of the lock timeout
/// rounds below it.
const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(1);

/// Host identity used when neither configuration nor environment names one.
const FALLBACK_HOST_IDENTITY: &str = "localhost";

/// Errors raised while validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A field holds an unusable value.
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Cipher key material was rejected.
    #[error("Invalid cipher key: {0}")]
    Key(#[source] CipherError),
}

impl ConfigError {
    /// Creates a [`ConfigError::Invalid`].
    #[must_use]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

/// Top-level registry configuration.
#[derive(Debug, Clone, Default, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Identity this node presents as lease owner.
    #[serde(default)]
    #[builder(into)]
    pub host_name: Option<String>,

    /// Cleaner lease settings.
    #[serde(default)]
    #[builder(default)]
    pub lock: LockConfig,

    /// How ticket updates guard against concurrent writers.
    #[serde(default)]
    #[builder(default)]
    pub ticket_lock_type: TicketLockType,

    /// At-rest payload protection.
    #[serde(default)]
    #[builder(default)]
    pub crypto: CipherConfig,

    /// Cleanup scheduler settings.
    #[serde(default)]
    #[builder(default)]
    pub cleaner: CleanerConfig,
}

impl RegistryConfig {
    /// Checks every field for values the registry cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an empty lock name, a zero lock timeout, a
    /// skew tolerance not below the lock timeout, a zero cleaner interval, or
    /// unusable cipher keys.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock.name.trim().is_empty() {
            return Err(ConfigError::invalid("lock.name", "must not be empty"));
        }
        if self.lock.timeout.is_zero() {
            return Err(ConfigError::invalid("lock.timeout", "must be greater than zero"));
        }
        if self.lock.skew_tolerance >= self.lock.timeout {
            return Err(ConfigError::invalid(
                "lock.skew_tolerance",
                format!(
                    "{:?} must be smaller than lock.timeout {:?}",
                    self.lock.skew_tolerance, self.lock.timeout
                ),
            ));
        }
        if self.cleaner.repeat_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ConfigError::invalid("cleaner.repeat_interval", "must be greater than zero"));
        }
        self.crypto.build().map(drop)
    }

    /// Resolves the lease owner identity for this node.
    ///
    /// Uses `host_name` when configured, then the `HOSTNAME` and
    /// `COMPUTERNAME` environment variables, then `"localhost"`.
    #[must_use]
    pub fn owner_id(&self) -> String {
        resolve_host_identity(self.host_name.as_deref(), |var| std::env::var(var).ok())
    }

    /// Interval between cleanup cycles: the configured value, or
    /// [`renew_interval`](Self::renew_interval).
    #[must_use]
    pub fn cleaner_interval(&self) -> Duration {
        self.cleaner.repeat_interval.unwrap_or_else(|| self.renew_interval())
    }

    /// Lease renewal cadence during a sweep: a third of the lock timeout,
    /// never below 1ms.
    #[must_use]
    pub fn renew_interval(&self) -> Duration {
        (self.lock.timeout / 3).max(MIN_RENEW_INTERVAL)
    }

    /// Settings for the [`LeaseLock`](crate::LeaseLock) behind the cleaner.
    #[must_use]
    pub fn lease_lock_config(&self) -> LeaseLockConfig {
        LeaseLockConfig::builder()
            .skew_tolerance(self.lock.skew_tolerance)
            .max_conflict_retries(self.lock.max_conflict_retries)
            .build()
    }
}

fn resolve_host_identity(
    configured: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    configured
        .map(str::to_owned)
        .or_else(|| lookup("HOSTNAME"))
        .or_else(|| lookup("COMPUTERNAME"))
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_HOST_IDENTITY.to_owned())
}

/// Settings for the cleaner lease.
#[derive(Debug, Clone, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Lease name shared by every node.
    #[serde(default = "default_lock_name")]
    #[builder(into, default = default_lock_name())]
    pub name: String,

    /// How long a granted lease lasts without renewal.
    #[serde(with = "humantime_serde", default = "default_lock_timeout")]
    #[builder(default = DEFAULT_LOCK_TIMEOUT)]
    pub timeout: Duration,

    /// Clock disagreement above which a skew warning is logged.
    #[serde(with = "humantime_serde", default = "default_skew_tolerance")]
    #[builder(default = DEFAULT_SKEW_TOLERANCE)]
    pub skew_tolerance: Duration,

    /// Immediate retries after losing a commit race.
    #[serde(default = "default_max_conflict_retries")]
    #[builder(default = DEFAULT_MAX_CONFLICT_RETRIES)]
    pub max_conflict_retries: usize,
}

fn default_lock_name() -> String {
    DEFAULT_LOCK_NAME.to_owned()
}

fn default_lock_timeout() -> Duration {
    DEFAULT_LOCK_TIMEOUT
}

fn default_skew_tolerance() -> Duration {
    DEFAULT_SKEW_TOLERANCE
}

fn default_max_conflict_retries() -> usize {
    DEFAULT_MAX_CONFLICT_RETRIES
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            name: default_lock_name(),
            timeout: DEFAULT_LOCK_TIMEOUT,
            skew_tolerance: DEFAULT_SKEW_TOLERANCE,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

/// Settings for the periodic cleanup scheduler.
#[derive(Debug, Clone, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanerConfig {
    /// Whether this node runs the scheduler at all.
    #[serde(default = "default_enabled")]
    #[builder(default = true)]
    pub enabled: bool,

    /// Delay before the first cycle.
    #[serde(with = "humantime_serde", default = "default_start_delay")]
    #[builder(default = DEFAULT_START_DELAY)]
    pub start_delay: Duration,

    /// Interval between cycles; a third of the lock timeout when unset.
    #[serde(with = "humantime_serde", default)]
    pub repeat_interval: Option<Duration>,
}

fn default_enabled() -> bool {
    true
}

fn default_start_delay() -> Duration {
    DEFAULT_START_DELAY
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self { enabled: true, start_delay: DEFAULT_START_DELAY, repeat_interval: None }
    }
}

/// Key material and switch for payload encryption.
///
/// Keys are base64 strings kept in [`Zeroizing`] buffers; the registry never
/// generates or persists them.
#[derive(Clone, Default, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CipherConfig {
    /// Encrypt and sign payloads when `true`.
    #[serde(default)]
    #[builder(default)]
    pub enabled: bool,

    /// Base64 AES-256 key (32 bytes once decoded).
    #[serde(default)]
    #[builder(into)]
    pub encryption_key: Option<Zeroizing<String>>,

    /// Base64 HMAC-SHA-512 key (at least 32 bytes once decoded).
    #[serde(default)]
    #[builder(into)]
    pub signing_key: Option<Zeroizing<String>>,
}

impl CipherConfig {
    /// Builds the configured cipher, or [`NoOpCipher`] when disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if encryption is enabled and a key is missing,
    /// not base64, or the wrong length.
    pub fn build(&self) -> Result<Arc<dyn PayloadCipher>, ConfigError> {
        if !self.enabled {
            return Ok(Arc::new(NoOpCipher));
        }
        let encryption_key = decode_key("crypto.encryption_key", self.encryption_key.as_ref())?;
        let signing_key = decode_key("crypto.signing_key", self.signing_key.as_ref())?;
        let cipher =
            EncryptThenSignCipher::new(&encryption_key, &signing_key).map_err(ConfigError::Key)?;
        Ok(Arc::new(cipher))
    }
}

impl fmt::Debug for CipherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<Zeroizing<String>>| key.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("CipherConfig")
            .field("enabled", &self.enabled)
            .field("encryption_key", &redact(&self.encryption_key))
            .field("signing_key", &redact(&self.signing_key))
            .finish()
    }
}

fn decode_key(
    field: &'static str,
    encoded: Option<&Zeroizing<String>>,
) -> Result<Zeroizing<Vec<u8>>, ConfigError> {
    let encoded =
        encoded.ok_or_else(|| ConfigError::invalid(field, "required when encryption is enabled"))?;
    STANDARD
        .decode(encoded.trim())
        .map(Zeroizing::new)
        .map_err(|err| ConfigError::invalid(field, format!("not valid base64: {err}")))
}
