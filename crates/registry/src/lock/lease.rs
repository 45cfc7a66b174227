//! The lease primitive.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticket_registry_storage::{Clock, StorageBackend, StorageError, SystemClock, Table};

use crate::{
    config::{DEFAULT_MAX_CONFLICT_RETRIES, DEFAULT_SKEW_TOLERANCE},
    error::{RegistryError, RegistryResult},
};

/// Minimum amount a renewal moves the expiry forward, in milliseconds.
const RENEWAL_STEP_MS: i64 = 1;

/// A row of the `leases` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Lease {
    /// Name of the protected resource.
    pub name: String,
    /// Identity of the holding node.
    pub owner: String,
    /// The lease is valid while the store clock is before this instant.
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Returns `true` once `now` has reached the expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of [`LeaseLock::acquire`].
///
/// On denial `owner` and `expires_at` describe the current holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseResult {
    /// Whether the caller now holds the lease.
    pub granted: bool,
    /// Current holder after the call.
    pub owner: String,
    /// Current expiry after the call.
    pub expires_at: DateTime<Utc>,
}

impl LeaseResult {
    fn granted(lease: &Lease) -> Self {
        Self { granted: true, owner: lease.owner.clone(), expires_at: lease.expires_at }
    }

    fn denied(lease: Lease) -> Self {
        Self { granted: false, owner: lease.owner, expires_at: lease.expires_at }
    }
}

/// Tuning for [`LeaseLock`].
#[derive(Debug, Clone, bon::Builder)]
pub struct LeaseLockConfig {
    /// Store/local clock disagreement above which a warning is logged.
    #[builder(default = DEFAULT_SKEW_TOLERANCE)]
    pub skew_tolerance: Duration,
    /// Immediate retries after losing a commit race.
    #[builder(default = DEFAULT_MAX_CONFLICT_RETRIES)]
    pub max_conflict_retries: usize,
}

impl Default for LeaseLockConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// How an acquire changed the lease row.
#[derive(Debug, Clone, Copy)]
enum Transition {
    Created,
    Reassigned,
    Renewed,
}

/// Named, cluster-wide exclusive leases over a [`StorageBackend`].
///
/// All decisions use the store clock ([`StorageBackend::now`]). The local
/// clock is only consulted to warn about skew.
///
/// ```
/// use std::time::Duration;
///
/// use ticket_registry::{LeaseLock, LeaseLockConfig};
/// use ticket_registry_storage::MemoryBackend;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let lock = LeaseLock::new(MemoryBackend::new(), LeaseLockConfig::default());
///
/// let a = lock.acquire("cleaner", "node-a", Duration::from_secs(30)).await.unwrap();
/// let b = lock.acquire("cleaner", "node-b", Duration::from_secs(30)).await.unwrap();
/// assert!(a.granted);
/// assert!(!b.granted);
/// assert_eq!(b.owner, "node-a");
/// # });
/// ```
pub struct LeaseLock<B> {
    backend: B,
    config: LeaseLockConfig,
    local_clock: Arc<dyn Clock>,
}

impl<B: StorageBackend> LeaseLock<B> {
    /// Creates a lease lock over `backend`.
    pub fn new(backend: B, config: LeaseLockConfig) -> Self {
        Self { backend, config, local_clock: Arc::new(SystemClock) }
    }

    /// Replaces the local clock used for skew detection.
    #[must_use]
    pub fn with_local_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.local_clock = Arc::new(clock);
        self
    }

    /// The backend holding the lease rows.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Acquires or renews the lease `name` for `owner`.
    ///
    /// - No row: inserted with `expires_at = now + duration`; granted.
    /// - Row lapsed (`now >= expires_at`): reassigned to `owner`; granted.
    /// - Row held by `owner`: expiry extended to `max(now + duration, previous + 1ms)`; granted.
    /// - Row held by someone else: untouched; denied.
    ///
    /// A concurrent writer that commits first makes this attempt retry
    /// immediately; the retry re-reads the row.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidLeaseDuration`] if `duration` is zero or too large
    /// - [`RegistryError::StoreUnavailable`] if the store fails
    /// - [`RegistryError::Contention`] if every retry lost a commit race
    #[tracing::instrument(skip(self))]
    pub async fn acquire(
        &self,
        name: &str,
        owner: &str,
        duration: Duration,
    ) -> RegistryResult<LeaseResult> {
        let lease_duration = to_lease_duration(duration)?;
        let key = Table::Leases.key(name);

        for attempt in 0..=self.config.max_conflict_retries {
            let outcome = self.try_acquire(&key, name, owner, duration, lease_duration).await?;
            if let Some(result) = outcome {
                return Ok(result);
            }
            tracing::debug!(attempt, "lease changed concurrently, retrying acquire");
        }
        Err(RegistryError::Contention {
            key: name.to_owned(),
            attempts: self.config.max_conflict_retries + 1,
        })
    }

    /// One read-decide-write round. `Ok(None)` means the commit lost a race.
    async fn try_acquire(
        &self,
        key: &[u8],
        name: &str,
        owner: &str,
        duration: Duration,
        lease_duration: chrono::Duration,
    ) -> RegistryResult<Option<LeaseResult>> {
        let now = self.backend.now();
        self.check_skew(now);
        let expires_at = now
            .checked_add_signed(lease_duration)
            .ok_or(RegistryError::InvalidLeaseDuration { duration })?;

        let mut txn = self.backend.transaction().await?;
        let current = txn.get(key).await?;
        let previous = current.as_deref().map(|bytes| decode_lease(key, bytes)).transpose()?;

        let fresh = || Lease { name: name.to_owned(), owner: owner.to_owned(), expires_at };
        let (lease, transition) = match previous {
            None => (fresh(), Transition::Created),
            Some(held) if held.is_expired(now) => {
                tracing::debug!(previous_owner = %held.owner, "lease lapsed");
                (fresh(), Transition::Reassigned)
            },
            Some(held) if held.owner == owner => {
                let floor = held
                    .expires_at
                    .checked_add_signed(chrono::Duration::milliseconds(RENEWAL_STEP_MS))
                    .unwrap_or(held.expires_at);
                (Lease { expires_at: expires_at.max(floor), ..held }, Transition::Renewed)
            },
            Some(held) => {
                txn.rollback().await;
                tracing::debug!(
                    holder = %held.owner,
                    expires_at = %held.expires_at,
                    "lease held by another owner"
                );
                return Ok(Some(LeaseResult::denied(held)));
            },
        };

        let expected = current.map(|bytes| bytes.to_vec());
        txn.compare_and_set(key.to_vec(), expected, encode_lease(&lease)?)?;
        match txn.commit().await {
            Ok(()) => {},
            Err(StorageError::Conflict) => return Ok(None),
            Err(err) => return Err(err.into()),
        }

        match transition {
            Transition::Created | Transition::Reassigned => tracing::info!(
                expires_at = %lease.expires_at,
                transition = ?transition,
                "lease granted"
            ),
            Transition::Renewed => tracing::debug!(expires_at = %lease.expires_at, "lease renewed"),
        }
        Ok(Some(LeaseResult::granted(&lease)))
    }

    /// Releases `name` if `owner` is its current, unexpired holder.
    ///
    /// Returns `true` when the row was removed. Releasing a lease held by
    /// someone else, already lapsed, or absent does nothing and returns `false`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::StoreUnavailable`] if the store fails
    /// - [`RegistryError::Contention`] if every retry lost a commit race
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, name: &str, owner: &str) -> RegistryResult<bool> {
        let key = Table::Leases.key(name);

        for attempt in 0..=self.config.max_conflict_retries {
            let now = self.backend.now();
            let mut txn = self.backend.transaction().await?;
            let Some(current) = txn.get(&key).await? else {
                txn.rollback().await;
                return Ok(false);
            };

            let held = decode_lease(&key, &current)?;
            if held.owner != owner || held.is_expired(now) {
                txn.rollback().await;
                tracing::debug!(
                    holder = %held.owner,
                    "release ignored, caller is not the active holder"
                );
                return Ok(false);
            }

            txn.compare_and_delete(key.clone(), current.to_vec())?;
            match txn.commit().await {
                Ok(()) => {
                    tracing::debug!("lease released");
                    return Ok(true);
                },
                Err(StorageError::Conflict) => {
                    tracing::debug!(attempt, "lease changed concurrently, retrying release");
                },
                Err(err) => return Err(err.into()),
            }
        }
        Err(RegistryError::Contention {
            key: name.to_owned(),
            attempts: self.config.max_conflict_retries + 1,
        })
    }

    /// Returns the current holder of `name`, or `None` if the lease is
    /// absent or lapsed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StoreUnavailable`] if the store fails.
    #[tracing::instrument(skip(self))]
    pub async fn holder(&self, name: &str) -> RegistryResult<Option<Lease>> {
        let key = Table::Leases.key(name);
        let now = self.backend.now();
        let Some(bytes) = self.backend.get(&key).await? else {
            return Ok(None);
        };
        let lease = decode_lease(&key, &bytes)?;
        Ok((!lease.is_expired(now)).then_some(lease))
    }

    fn check_skew(&self, store_now: DateTime<Utc>) {
        let local_now = self.local_clock.now();
        let skew = (store_now - local_now).abs();
        let exceeds = chrono::Duration::from_std(self.config.skew_tolerance)
            .map(|tolerance| skew > tolerance)
            .unwrap_or(false);
        if exceeds {
            tracing::warn!(
                store_time = %store_now,
                local_time = %local_now,
                skew_ms = skew.num_milliseconds(),
                "clock skew suspected"
            );
        }
    }
}

impl<B> std::fmt::Debug for LeaseLock<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseLock")
            .field("config", &self.config)
            .field("local_clock", &self.local_clock)
            .finish_non_exhaustive()
    }
}

fn to_lease_duration(duration: Duration) -> RegistryResult<chrono::Duration> {
    if duration.is_zero() {
        return Err(RegistryError::InvalidLeaseDuration { duration });
    }
    chrono::Duration::from_std(duration).map_err(|_| RegistryError::InvalidLeaseDuration { duration })
}

fn encode_lease(lease: &Lease) -> RegistryResult<Vec<u8>> {
    serde_json::to_vec(lease)
        .map_err(|err| RegistryError::serialization(lease.name.as_bytes(), err.to_string()))
}

fn decode_lease(key: &[u8], bytes: &[u8]) -> RegistryResult<Lease> {
    serde_json::from_slice(bytes).map_err(|err| RegistryError::serialization(key, err.to_string()))
}
