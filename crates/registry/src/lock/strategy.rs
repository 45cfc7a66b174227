//! Locking strategies handed to the cleanup scheduler.

use std::time::Duration;

use async_trait::async_trait;
use ticket_registry_storage::StorageBackend;

use super::LeaseLock;
use crate::{config::DEFAULT_LOCK_NAME, error::RegistryResult};

/// A lock the scheduler takes before each cleanup cycle.
///
/// Calling [`acquire`](LockingStrategy::acquire) again while holding the
/// lock renews it.
#[async_trait]
pub trait LockingStrategy: Send + Sync + std::fmt::Debug {
    /// Attempts to take or renew the lock. `Ok(false)` means another node
    /// holds it, which is normal contention.
    async fn acquire(&self) -> RegistryResult<bool>;

    /// Gives the lock up if this node holds it.
    async fn release(&self) -> RegistryResult<()>;
}

/// A [`LeaseLock`] bound to one lease name, owner and timeout.
///
/// ```
/// use std::time::Duration;
///
/// use ticket_registry::{LeaseLock, LeaseLockConfig, LeaseLockingStrategy, LockingStrategy};
/// use ticket_registry_storage::MemoryBackend;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
/// let node_a = LeaseLockingStrategy::builder()
///     .lock(LeaseLock::new(backend.clone(), LeaseLockConfig::default()))
///     .owner("node-a")
///     .timeout(Duration::from_secs(60))
///     .build();
/// let node_b = LeaseLockingStrategy::builder()
///     .lock(LeaseLock::new(backend, LeaseLockConfig::default()))
///     .owner("node-b")
///     .timeout(Duration::from_secs(60))
///     .build();
///
/// assert!(node_a.acquire().await.unwrap());
/// assert!(!node_b.acquire().await.unwrap());
/// node_a.release().await.unwrap();
/// assert!(node_b.acquire().await.unwrap());
/// # });
/// ```
pub struct LeaseLockingStrategy<B> {
    lock: LeaseLock<B>,
    name: String,
    owner: String,
    timeout: Duration,
}

#[bon::bon]
impl<B: StorageBackend> LeaseLockingStrategy<B> {
    /// Creates a strategy.
    ///
    /// `name` defaults to `cas-ticket-registry-cleaner`.
    #[builder]
    pub fn new(
        lock: LeaseLock<B>,
        #[builder(into, default = DEFAULT_LOCK_NAME.to_owned())] name: String,
        #[builder(into)] owner: String,
        timeout: Duration,
    ) -> Self {
        Self { lock, name, owner, timeout }
    }

    /// Lease name this strategy locks.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owner identity presented to the lease.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The underlying lease lock.
    pub fn lease_lock(&self) -> &LeaseLock<B> {
        &self.lock
    }
}

impl<B> std::fmt::Debug for LeaseLockingStrategy<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseLockingStrategy")
            .field("lock", &self.lock)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl<B: StorageBackend> LockingStrategy for LeaseLockingStrategy<B> {
    async fn acquire(&self) -> RegistryResult<bool> {
        let result = self.lock.acquire(&self.name, &self.owner, self.timeout).await?;
        Ok(result.granted)
    }

    async fn release(&self) -> RegistryResult<()> {
        self.lock.release(&self.name, &self.owner).await.map(drop)
    }
}

/// Always grants. For deployments where a single node runs the scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLockingStrategy;

#[async_trait]
impl LockingStrategy for NoOpLockingStrategy {
    async fn acquire(&self) -> RegistryResult<bool> {
        Ok(true)
    }

    async fn release(&self) -> RegistryResult<()> {
        Ok(())
    }
}
