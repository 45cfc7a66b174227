//! Assembles the registry components for one server node.

use std::sync::Arc;

use ticket_registry_storage::StorageBackend;

use crate::{
    catalog::TicketCatalog,
    cleaner::{CleanerHandle, RegistryCleaner},
    config::RegistryConfig,
    error::RegistryResult,
    lock::{LeaseLock, LeaseLockingStrategy, LockingStrategy},
    ticket::{DefaultTicketRegistry, TicketRegistry},
};

/// The ticket registry, cleaner lock and cleanup scheduler of one node,
/// wired from a shared backend and a [`RegistryConfig`].
///
/// ```
/// use ticket_registry::{RegistryConfig, RegistryNode, TicketCatalog, TicketRegistry};
/// use ticket_registry_storage::MemoryBackend;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let config = RegistryConfig::builder().host_name("cas-1").build();
/// let node = RegistryNode::new(MemoryBackend::new(), TicketCatalog::standard(), config)?;
///
/// assert_eq!(node.registry().count(Default::default()).await?, 0);
/// let handle = node.start_cleaner();
/// if let Some(handle) = handle {
///     handle.shutdown().await;
/// }
/// # Ok::<(), ticket_registry::RegistryError>(())
/// # }).unwrap();
/// ```
pub struct RegistryNode<B> {
    registry: Arc<DefaultTicketRegistry<B>>,
    locking_strategy: Arc<dyn LockingStrategy>,
    cleaner: Arc<RegistryCleaner>,
    config: RegistryConfig,
}

impl<B: StorageBackend + Clone + 'static> RegistryNode<B> {
    /// Validates `config` and builds every component over `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Config`](crate::RegistryError::Config) if the
    /// configuration is invalid.
    pub fn new(backend: B, catalog: TicketCatalog, config: RegistryConfig) -> RegistryResult<Self> {
        config.validate()?;
        let cipher = config.crypto.build()?;
        let owner = config.owner_id();

        tracing::info!(
            owner = %owner,
            lock = %config.lock.name,
            lock_timeout = ?config.lock.timeout,
            encryption = cipher.is_enabled(),
            ticket_lock_type = ?config.ticket_lock_type,
            "ticket registry configured"
        );

        let registry = Arc::new(
            DefaultTicketRegistry::builder()
                .backend(backend.clone())
                .catalog(catalog)
                .cipher(cipher)
                .lock_type(config.ticket_lock_type)
                .max_conflict_retries(config.lock.max_conflict_retries)
                .build(),
        );

        let locking_strategy: Arc<dyn LockingStrategy> = Arc::new(
            LeaseLockingStrategy::builder()
                .lock(LeaseLock::new(backend, config.lease_lock_config()))
                .name(config.lock.name.clone())
                .owner(owner)
                .timeout(config.lock.timeout)
                .build(),
        );

        let dyn_registry: Arc<dyn TicketRegistry> = registry.clone();
        let cleaner = Arc::new(
            RegistryCleaner::builder()
                .registry(dyn_registry)
                .locking_strategy(Arc::clone(&locking_strategy))
                .renew_interval(config.renew_interval())
                .build(),
        );

        Ok(Self { registry, locking_strategy, cleaner, config })
    }

    /// The ticket store.
    pub fn registry(&self) -> &Arc<DefaultTicketRegistry<B>> {
        &self.registry
    }

    /// The lock the cleaner takes.
    pub fn locking_strategy(&self) -> &Arc<dyn LockingStrategy> {
        &self.locking_strategy
    }

    /// The cleanup scheduler.
    pub fn cleaner(&self) -> &Arc<RegistryCleaner> {
        &self.cleaner
    }

    /// The configuration this node was built from.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Spawns the cleaner if it is enabled in the configuration.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use = "dropping the handle stops the cleaner"]
    pub fn start_cleaner(&self) -> Option<CleanerHandle> {
        if !self.config.cleaner.enabled {
            tracing::info!("registry cleaner disabled");
            return None;
        }
        let interval = self.config.cleaner_interval();
        tracing::info!(
            start_delay = ?self.config.cleaner.start_delay,
            interval = ?interval,
            "starting registry cleaner"
        );
        Some(Arc::clone(&self.cleaner).spawn(self.config.cleaner.start_delay, interval))
    }
}

impl<B> std::fmt::Debug for RegistryNode<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryNode")
            .field("registry", &self.registry)
            .field("cleaner", &self.cleaner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
