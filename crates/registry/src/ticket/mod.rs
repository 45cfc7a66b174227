//! Tickets and the store that persists them.
//!
//! A [`Ticket`] is an opaque payload with an id, a type discriminator and an
//! [`ExpirationPolicy`]. The [`TicketRegistry`] trait is the contract callers
//! program against; [`DefaultTicketRegistry`] implements it over any
//! [`StorageBackend`](ticket_registry_storage::StorageBackend).

mod registry;
mod row;

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use self::registry::{DefaultTicketRegistry, TicketIter, TicketRegistry};

/// A persisted authentication artifact.
///
/// ```
/// use std::time::Duration;
///
/// use chrono::Utc;
/// use ticket_registry::{ExpirationPolicy, Ticket};
///
/// let ticket = Ticket::builder()
///     .id("ST-1-abc")
///     .ticket_type("ST")
///     .payload(b"service=https://app".to_vec())
///     .expiration(ExpirationPolicy::time_to_live(Utc::now(), Duration::from_secs(10)))
///     .build();
/// assert!(!ticket.is_expired(Utc::now()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct Ticket {
    /// Globally unique id assigned by the issuer.
    #[builder(into)]
    pub id: String,
    /// Catalog type discriminator.
    #[builder(into)]
    pub ticket_type: String,
    /// Logical payload, before any cipher transform.
    #[builder(into)]
    pub payload: Bytes,
    /// When the ticket stops being valid.
    pub expiration: ExpirationPolicy,
}

impl Ticket {
    /// Instant at which the ticket expires, if ever.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiration.expires_at()
    }

    /// Returns `true` if the ticket has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_expired(now)
    }
}

/// Data needed to decide whether a ticket has expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpirationPolicy {
    /// Expires `ttl` after `created_at`.
    TimeToLive {
        /// Issuance time.
        created_at: DateTime<Utc>,
        /// Lifetime from issuance.
        #[serde(with = "humantime_serde")]
        ttl: Duration,
    },
    /// Expires at a fixed instant.
    Absolute {
        /// Expiry instant.
        expires_at: DateTime<Utc>,
    },
    /// Never expires; only explicit deletion removes it.
    Never,
}

impl ExpirationPolicy {
    /// Creates a [`ExpirationPolicy::TimeToLive`].
    #[must_use]
    pub fn time_to_live(created_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self::TimeToLive { created_at, ttl }
    }

    /// Creates an [`ExpirationPolicy::Absolute`].
    #[must_use]
    pub fn absolute(expires_at: DateTime<Utc>) -> Self {
        Self::Absolute { expires_at }
    }

    /// Computed expiry instant.
    ///
    /// A time-to-live too large to represent is treated as never expiring.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::TimeToLive { created_at, ttl } => chrono::Duration::from_std(*ttl)
                .ok()
                .and_then(|ttl| created_at.checked_add_signed(ttl)),
            Self::Absolute { expires_at } => Some(*expires_at),
            Self::Never => None,
        }
    }

    /// Returns `true` once `now` has reached the computed expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires_at| expires_at <= now)
    }
}

/// How [`TicketRegistry::update`] guards against concurrent writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketLockType {
    /// Overwrite after an existence check; last writer wins.
    None,
    /// Conditional write against the row read in the same transaction.
    #[default]
    Write,
}

/// Selects tickets by type discriminator for [`TicketRegistry::get_all`]
/// and [`TicketRegistry::count`].
#[derive(Clone)]
pub struct TypeFilter(Arc<dyn Fn(&str) -> bool + Send + Sync>);

impl TypeFilter {
    /// Matches every ticket.
    #[must_use]
    pub fn any() -> Self {
        Self(Arc::new(|_| true))
    }

    /// Matches tickets of the listed types.
    #[must_use]
    pub fn only<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let types: Vec<String> = types.into_iter().map(Into::into).collect();
        Self(Arc::new(move |ticket_type| types.iter().any(|t| t == ticket_type)))
    }

    /// Matches tickets for which `predicate` returns `true`.
    pub fn matching(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    /// Applies the filter to a type discriminator.
    #[must_use]
    pub fn matches(&self, ticket_type: &str) -> bool {
        (self.0)(ticket_type)
    }
}

impl Default for TypeFilter {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Debug for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeFilter").finish_non_exhaustive()
    }
}
