//! Periodic expired-ticket cleanup.
//!
//! Every node runs its own [`RegistryCleaner`] on an independent timer. A
//! cycle only sweeps after the [`LockingStrategy`] grants, so across the
//! cluster at most one node sweeps at a time. While a sweep is running the
//! lease is renewed every `renew_interval`; if renewal is denied the sweep is
//! dropped, which rolls back its uncommitted transaction.

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::DEFAULT_LOCK_TIMEOUT, error::RegistryResult, lock::LockingStrategy,
    ticket::TicketRegistry,
};

/// Default lease renewal cadence during a sweep: a third of the default
/// lock timeout.
const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(DEFAULT_LOCK_TIMEOUT.as_secs() / 3);

/// Result of one cleanup cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanOutcome {
    /// Another node holds the lease; nothing was done.
    Skipped,
    /// The sweep ran and removed this many tickets.
    Cleaned(usize),
    /// The lease was lost mid-sweep and the sweep was rolled back.
    Abandoned,
}

/// Runs [`TicketRegistry::delete_expired`] under a cluster-wide lock.
pub struct RegistryCleaner {
    registry: Arc<dyn TicketRegistry>,
    locking_strategy: Arc<dyn LockingStrategy>,
    renew_interval: Duration,
}

#[bon::bon]
impl RegistryCleaner {
    /// Creates a cleaner.
    ///
    /// # Optional Fields
    ///
    /// * `renew_interval` - Lease renewal cadence during a sweep (default: 20 minutes). Must be
    ///   below the lease timeout; zero selects the default.
    #[builder]
    pub fn new(
        registry: Arc<dyn TicketRegistry>,
        locking_strategy: Arc<dyn LockingStrategy>,
        #[builder(default = DEFAULT_RENEW_INTERVAL)] renew_interval: Duration,
    ) -> Self {
        let renew_interval =
            if renew_interval.is_zero() { DEFAULT_RENEW_INTERVAL } else { renew_interval };
        Self { registry, locking_strategy, renew_interval }
    }

    /// Runs one cycle: acquire, sweep, release.
    ///
    /// A denied lease is a normal skip. The lease is released after every
    /// granted cycle, including one whose sweep failed.
    ///
    /// # Errors
    ///
    /// Returns the lock or store failure that ended the cycle.
    #[tracing::instrument(skip(self))]
    pub async fn clean(&self) -> RegistryResult<CleanOutcome> {
        if !self.locking_strategy.acquire().await? {
            tracing::debug!("cleaner lease held by another node, skipping cycle");
            return Ok(CleanOutcome::Skipped);
        }

        let outcome = self.sweep_holding_lease().await;
        if let Err(err) = self.locking_strategy.release().await {
            tracing::warn!(error = %err, "failed to release cleaner lease");
        }

        let outcome = outcome?;
        if let CleanOutcome::Cleaned(removed) = outcome {
            tracing::info!(removed, "ticket cleanup cycle finished");
        }
        Ok(outcome)
    }

    async fn sweep_holding_lease(&self) -> RegistryResult<CleanOutcome> {
        let now = self.registry.now();
        let sweep = self.registry.delete_expired(now);
        tokio::pin!(sweep);

        let mut renewal = tokio::time::interval(self.renew_interval);
        renewal.set_missed_tick_behavior(MissedTickBehavior::Delay);
        renewal.tick().await;

        loop {
            tokio::select! {
                removed = &mut sweep => return removed.map(CleanOutcome::Cleaned),
                _ = renewal.tick() => match self.locking_strategy.acquire().await {
                    Ok(true) => tracing::debug!("cleaner lease renewed during sweep"),
                    Ok(false) => {
                        tracing::warn!("cleaner lease lost during sweep, abandoning");
                        return Ok(CleanOutcome::Abandoned);
                    },
                    Err(err) => {
                        tracing::warn!(error = %err, "cleaner lease renewal failed, abandoning sweep");
                        return Err(err);
                    },
                },
            }
        }
    }

    /// Starts the periodic cycle on the current Tokio runtime.
    ///
    /// The first cycle runs after `start_delay`, then every `interval`. A
    /// failed cycle is logged at WARN and the loop keeps going.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use = "dropping the handle stops the cleaner"]
    pub fn spawn(self: Arc<Self>, start_delay: Duration, interval: Duration) -> CleanerHandle {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let interval = if interval.is_zero() { self.renew_interval } else { interval };

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => return,
                _ = tokio::time::sleep(start_delay) => {},
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        tracing::info!("registry cleaner shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = self.clean().await {
                            tracing::warn!(
                                error = %err,
                                retryable = err.is_retryable(),
                                "ticket cleanup cycle failed"
                            );
                        }
                    }
                }
            }
        });

        CleanerHandle { token, handle: Some(handle) }
    }
}

impl std::fmt::Debug for RegistryCleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCleaner")
            .field("locking_strategy", &self.locking_strategy)
            .field("renew_interval", &self.renew_interval)
            .finish_non_exhaustive()
    }
}

/// Handle to a running cleaner task.
///
/// Dropping the handle cancels the task without waiting for it.
#[derive(Debug)]
pub struct CleanerHandle {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CleanerHandle {
    /// Stops the cleaner and waits for an in-flight cycle to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "registry cleaner task panicked");
            }
        }
    }

    /// Returns `true` once the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for CleanerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{DateTime, TimeZone, Utc};
    use ticket_registry_storage::{ManualClock, MemoryBackend, StorageError};

    use super::*;
    use crate::{
        catalog::TicketCatalog,
        error::RegistryError,
        lock::NoOpLockingStrategy,
        ticket::{DefaultTicketRegistry, ExpirationPolicy, Ticket, TicketIter, TypeFilter},
    };

    /// Records calls and answers `acquire` from a script.
    #[derive(Debug)]
    struct ScriptedStrategy {
        grants: Vec<bool>,
        fail_at: Option<usize>,
        acquires: AtomicUsize,
        releases: AtomicUsize,
    }

    impl ScriptedStrategy {
        fn new(grants: Vec<bool>) -> Self {
            Self {
                grants,
                fail_at: None,
                acquires: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
            }
        }

        /// Grants until the `call`th acquire, which fails with a store error.
        fn failing_at(call: usize) -> Self {
            Self { fail_at: Some(call), ..Self::new(vec![true; call]) }
        }
    }

    #[async_trait]
    impl LockingStrategy for ScriptedStrategy {
        async fn acquire(&self) -> RegistryResult<bool> {
            let call = self.acquires.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == Some(call) {
                return Err(StorageError::connection("lease store unreachable").into());
            }
            Ok(self.grants.get(call).copied().unwrap_or(false))
        }

        async fn release(&self) -> RegistryResult<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Delays every sweep so lease renewal fires while it is in flight.
    struct SlowRegistry {
        inner: Arc<DefaultTicketRegistry<MemoryBackend>>,
        delay: Duration,
    }

    #[async_trait]
    impl TicketRegistry for SlowRegistry {
        async fn insert(&self, ticket: &Ticket) -> RegistryResult<()> {
            self.inner.insert(ticket).await
        }

        async fn update(&self, ticket: &Ticket) -> RegistryResult<()> {
            self.inner.update(ticket).await
        }

        async fn get(&self, id: &str) -> RegistryResult<Ticket> {
            self.inner.get(id).await
        }

        async fn delete(&self, id: &str) -> RegistryResult<()> {
            self.inner.delete(id).await
        }

        async fn delete_expired(&self, now: DateTime<Utc>) -> RegistryResult<usize> {
            tokio::time::sleep(self.delay).await;
            self.inner.delete_expired(now).await
        }

        async fn get_all(&self, filter: TypeFilter) -> RegistryResult<TicketIter> {
            self.inner.get_all(filter).await
        }

        async fn count(&self, filter: TypeFilter) -> RegistryResult<usize> {
            self.inner.count(filter).await
        }

        async fn delete_all(&self) -> RegistryResult<usize> {
            self.inner.delete_all().await
        }

        fn now(&self) -> DateTime<Utc> {
            self.inner.now()
        }
    }

    fn slow_cleaner(
        inner: Arc<DefaultTicketRegistry<MemoryBackend>>,
        strategy: Arc<ScriptedStrategy>,
    ) -> RegistryCleaner {
        RegistryCleaner::builder()
            .registry(Arc::new(SlowRegistry { inner, delay: Duration::from_secs(100) }))
            .locking_strategy(strategy)
            .renew_interval(Duration::from_secs(10))
            .build()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    async fn registry_with_expired(count: usize) -> Arc<DefaultTicketRegistry<MemoryBackend>> {
        let registry = DefaultTicketRegistry::builder()
            .backend(MemoryBackend::with_clock(ManualClock::new(at(100))))
            .catalog(TicketCatalog::standard())
            .build();
        for i in 0..count {
            let ticket = Ticket::builder()
                .id(format!("ST-{i}"))
                .ticket_type("ST")
                .payload(Bytes::new())
                .expiration(ExpirationPolicy::absolute(at(50)))
                .build();
            registry.insert(&ticket).await.unwrap();
        }
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_denied_lease_skips_without_release() {
        let strategy = Arc::new(ScriptedStrategy::new(vec![false]));
        let cleaner = RegistryCleaner::builder()
            .registry(registry_with_expired(3).await)
            .locking_strategy(strategy.clone())
            .build();

        assert_eq!(cleaner.clean().await.unwrap(), CleanOutcome::Skipped);
        assert_eq!(strategy.releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_granted_lease_sweeps_then_releases() {
        let registry = registry_with_expired(3).await;
        let strategy = Arc::new(ScriptedStrategy::new(vec![true]));
        let cleaner = RegistryCleaner::builder()
            .registry(registry.clone())
            .locking_strategy(strategy.clone())
            .build();

        assert_eq!(cleaner.clean().await.unwrap(), CleanOutcome::Cleaned(3));
        assert_eq!(strategy.releases.load(Ordering::SeqCst), 1);
        assert!(matches!(registry.get("ST-0").await, Err(RegistryError::NotFound { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_lost_mid_sweep_abandons_and_releases() {
        let registry = registry_with_expired(3).await;
        let strategy = Arc::new(ScriptedStrategy::new(vec![true, true, false]));
        let cleaner = slow_cleaner(registry.clone(), strategy.clone());

        assert_eq!(cleaner.clean().await.unwrap(), CleanOutcome::Abandoned);
        assert_eq!(strategy.acquires.load(Ordering::SeqCst), 3);
        assert_eq!(strategy.releases.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count(TypeFilter::any()).await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_renewal_surfaces_error_and_releases() {
        let registry = registry_with_expired(3).await;
        let strategy = Arc::new(ScriptedStrategy::failing_at(1));
        let cleaner = slow_cleaner(registry.clone(), strategy.clone());

        let err = cleaner.clean().await.unwrap_err();
        assert!(matches!(err, RegistryError::StoreUnavailable(_)), "got {err:?}");
        assert!(err.is_retryable());
        assert_eq!(strategy.acquires.load(Ordering::SeqCst), 2);
        assert_eq!(strategy.releases.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count(TypeFilter::any()).await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewed_lease_lets_slow_sweep_finish() {
        let registry = registry_with_expired(3).await;
        let strategy = Arc::new(ScriptedStrategy::new(vec![true; 20]));
        let cleaner = slow_cleaner(registry.clone(), strategy.clone());

        assert_eq!(cleaner.clean().await.unwrap(), CleanOutcome::Cleaned(3));
        assert!(strategy.acquires.load(Ordering::SeqCst) >= 10);
        assert_eq!(strategy.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_renew_interval_selects_default() {
        let cleaner = RegistryCleaner::builder()
            .registry(Arc::new(SlowRegistry {
                inner: Arc::new(
                    DefaultTicketRegistry::builder()
                        .backend(MemoryBackend::new())
                        .catalog(TicketCatalog::standard())
                        .build(),
                ),
                delay: Duration::ZERO,
            }))
            .locking_strategy(Arc::new(NoOpLockingStrategy))
            .renew_interval(Duration::ZERO)
            .build();
        assert_eq!(cleaner.renew_interval, DEFAULT_RENEW_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_cleaner_runs_after_start_delay() {
        let registry = registry_with_expired(2).await;
        let cleaner = Arc::new(
            RegistryCleaner::builder()
                .registry(registry.clone())
                .locking_strategy(Arc::new(NoOpLockingStrategy))
                .build(),
        );

        let handle = cleaner.spawn(Duration::from_secs(15), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(registry.count(Default::default()).await.unwrap(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(registry.count(Default::default()).await.unwrap(), 0);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_start_delay() {
        let cleaner = Arc::new(
            RegistryCleaner::builder()
                .registry(registry_with_expired(1).await)
                .locking_strategy(Arc::new(NoOpLockingStrategy))
                .build(),
        );
        let handle = cleaner.spawn(Duration::from_secs(3600), Duration::from_secs(60));
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }
}
