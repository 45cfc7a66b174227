//! The ticket store contract and its store-backed implementation.

use std::{iter::FusedIterator, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ticket_registry_storage::{KeyValue, StorageBackend, StorageError, Table, prefix_range};

use super::{
    Ticket, TicketLockType, TypeFilter,
    row::{self, RowHeader},
};
use crate::{
    catalog::TicketCatalog,
    cipher::{NoOpCipher, PayloadCipher},
    config::DEFAULT_MAX_CONFLICT_RETRIES,
    error::{RegistryError, RegistryResult},
};

/// Cluster-shared ticket persistence.
///
/// Every mutating method is a single store transaction. None of them take
/// the cleaner lease; the lock and the store are independent primitives.
#[async_trait]
pub trait TicketRegistry: Send + Sync {
    /// Stores a new ticket.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateKey`] if the id is already stored
    /// - [`RegistryError::UnknownTicketType`] if the type is not in the catalog
    async fn insert(&self, ticket: &Ticket) -> RegistryResult<()>;

    /// Replaces the payload and expiry of an existing ticket.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotFound`] if no ticket has this id
    /// - [`RegistryError::UnknownTicketType`] if the type is not in the catalog
    async fn update(&self, ticket: &Ticket) -> RegistryResult<()>;

    /// Loads a ticket, reversing the cipher transform.
    ///
    /// Expired tickets are still returned; check
    /// [`Ticket::is_expired`] against [`now`](TicketRegistry::now).
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotFound`] if no ticket has this id
    /// - [`RegistryError::Integrity`] if the stored payload fails verification
    async fn get(&self, id: &str) -> RegistryResult<Ticket>;

    /// Removes a ticket. Removing an absent ticket succeeds.
    async fn delete(&self, id: &str) -> RegistryResult<()>;

    /// Removes every ticket whose computed expiry is `<= now` and returns how
    /// many were removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> RegistryResult<usize>;

    /// Returns a lazy iterator over the tickets whose type matches `filter`.
    async fn get_all(&self, filter: TypeFilter) -> RegistryResult<TicketIter>;

    /// Counts tickets whose type matches `filter` without decoding payloads.
    async fn count(&self, filter: TypeFilter) -> RegistryResult<usize>;

    /// Removes every ticket and returns how many were removed.
    async fn delete_all(&self) -> RegistryResult<usize>;

    /// Store-observed current time.
    fn now(&self) -> DateTime<Utc>;
}

/// [`TicketRegistry`] over a [`StorageBackend`].
///
/// ```
/// use bytes::Bytes;
/// use ticket_registry::{
///     DefaultTicketRegistry, ExpirationPolicy, Ticket, TicketCatalog, TicketRegistry,
/// };
/// use ticket_registry_storage::MemoryBackend;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let registry = DefaultTicketRegistry::builder()
///     .backend(MemoryBackend::new())
///     .catalog(TicketCatalog::standard())
///     .build();
///
/// let ticket = Ticket::builder()
///     .id("TGT-1")
///     .ticket_type("TGT")
///     .payload(Bytes::from_static(b"casuser"))
///     .expiration(ExpirationPolicy::Never)
///     .build();
/// registry.insert(&ticket).await.unwrap();
/// assert_eq!(registry.get("TGT-1").await.unwrap(), ticket);
/// # });
/// ```
pub struct DefaultTicketRegistry<B> {
    backend: B,
    catalog: Arc<TicketCatalog>,
    cipher: Arc<dyn PayloadCipher>,
    lock_type: TicketLockType,
    max_conflict_retries: usize,
}

#[bon::bon]
impl<B: StorageBackend> DefaultTicketRegistry<B> {
    /// Creates a registry.
    ///
    /// # Optional Fields
    ///
    /// * `cipher` - Payload transform (default: [`NoOpCipher`]).
    /// * `lock_type` - Update concurrency mode (default: [`TicketLockType::Write`]).
    /// * `max_conflict_retries` - Immediate retries after a lost commit race (default: 3).
    #[builder]
    pub fn new(
        backend: B,
        #[builder(into)] catalog: Arc<TicketCatalog>,
        #[builder(default = no_op_cipher())] cipher: Arc<dyn PayloadCipher>,
        #[builder(default)] lock_type: TicketLockType,
        #[builder(default = DEFAULT_MAX_CONFLICT_RETRIES)] max_conflict_retries: usize,
    ) -> Self {
        Self { backend, catalog, cipher, lock_type, max_conflict_retries }
    }
}

fn no_op_cipher() -> Arc<dyn PayloadCipher> {
    Arc::new(NoOpCipher)
}

impl<B> DefaultTicketRegistry<B> {
    /// The backend this registry writes to.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn check_type(&self, ticket_type: &str) -> RegistryResult<()> {
        if self.catalog.contains(ticket_type) {
            Ok(())
        } else {
            Err(RegistryError::unknown_ticket_type(ticket_type))
        }
    }

    fn contention(&self, key: impl Into<String>) -> RegistryError {
        RegistryError::Contention { key: key.into(), attempts: self.max_conflict_retries + 1 }
    }
}

impl<B> std::fmt::Debug for DefaultTicketRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultTicketRegistry")
            .field("catalog", &self.catalog)
            .field("cipher", &self.cipher)
            .field("lock_type", &self.lock_type)
            .field("max_conflict_retries", &self.max_conflict_retries)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<B: StorageBackend> TicketRegistry for DefaultTicketRegistry<B> {
    #[tracing::instrument(skip(self, ticket), fields(id = %ticket.id, ticket_type = %ticket.ticket_type))]
    async fn insert(&self, ticket: &Ticket) -> RegistryResult<()> {
        self.check_type(&ticket.ticket_type)?;
        let row = row::encode(ticket, self.cipher.as_ref())?;

        let mut txn = self.backend.transaction().await?;
        txn.compare_and_set(Table::Tickets.key(&ticket.id), None, row)?;
        match txn.commit().await {
            Ok(()) => {
                tracing::debug!("ticket stored");
                Ok(())
            },
            Err(StorageError::Conflict) => Err(RegistryError::duplicate_key(&ticket.id)),
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self, ticket), fields(id = %ticket.id, ticket_type = %ticket.ticket_type))]
    async fn update(&self, ticket: &Ticket) -> RegistryResult<()> {
        self.check_type(&ticket.ticket_type)?;
        let key = Table::Tickets.key(&ticket.id);
        let row = row::encode(ticket, self.cipher.as_ref())?;

        for attempt in 0..=self.max_conflict_retries {
            let mut txn = self.backend.transaction().await?;
            let Some(current) = txn.get(&key).await? else {
                txn.rollback().await;
                return Err(RegistryError::not_found(&ticket.id));
            };

            match self.lock_type {
                TicketLockType::Write => {
                    txn.compare_and_set(key.clone(), Some(current.to_vec()), row.clone())?;
                },
                TicketLockType::None => txn.set(key.clone(), row.clone()),
            }

            match txn.commit().await {
                Ok(()) => return Ok(()),
                Err(StorageError::Conflict) => {
                    tracing::debug!(attempt, "ticket changed concurrently, retrying update");
                },
                Err(err) => return Err(err.into()),
            }
        }
        Err(self.contention(&ticket.id))
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: &str) -> RegistryResult<Ticket> {
        let key = Table::Tickets.key(id);
        let bytes = self.backend.get(&key).await?.ok_or_else(|| RegistryError::not_found(id))?;
        row::decode(&key, &bytes, self.cipher.as_ref()).inspect_err(|err| {
            if err.is_integrity_failure() {
                tracing::warn!(error = %err, "stored ticket payload failed verification");
            }
        })
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: &str) -> RegistryResult<()> {
        self.backend.delete(&Table::Tickets.key(id)).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_expired(&self, now: DateTime<Utc>) -> RegistryResult<usize> {
        let range = prefix_range(Table::Tickets.prefix().as_bytes());

        for attempt in 0..=self.max_conflict_retries {
            let rows = self.backend.get_range(range.clone()).await?;
            let mut txn = self.backend.transaction().await?;
            let mut expired = 0usize;

            for KeyValue { key, value } in rows {
                match RowHeader::decode(&key, &value) {
                    Ok(header) if header.is_expired(now) => {
                        txn.compare_and_delete(key.to_vec(), value.to_vec())?;
                        expired += 1;
                    },
                    Ok(_) => {},
                    Err(err) => tracing::warn!(error = %err, "skipping undecodable ticket row"),
                }
            }

            if expired == 0 {
                txn.rollback().await;
                return Ok(0);
            }

            match txn.commit().await {
                Ok(()) => {
                    tracing::debug!(removed = expired, "expired tickets removed");
                    return Ok(expired);
                },
                Err(StorageError::Conflict) => {
                    tracing::debug!(attempt, "sweep raced a concurrent writer, rescanning");
                },
                Err(err) => return Err(err.into()),
            }
        }
        Err(self.contention(Table::Tickets.prefix()))
    }

    #[tracing::instrument(skip(self))]
    async fn get_all(&self, filter: TypeFilter) -> RegistryResult<TicketIter> {
        let rows = self.backend.get_range(prefix_range(Table::Tickets.prefix().as_bytes())).await?;
        Ok(TicketIter { rows: rows.into_iter(), cipher: Arc::clone(&self.cipher), filter })
    }

    #[tracing::instrument(skip(self))]
    async fn count(&self, filter: TypeFilter) -> RegistryResult<usize> {
        let rows = self.backend.get_range(prefix_range(Table::Tickets.prefix().as_bytes())).await?;
        let mut count = 0;
        for KeyValue { key, value } in rows {
            if filter.matches(&RowHeader::decode(&key, &value)?.ticket_type) {
                count += 1;
            }
        }
        Ok(count)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_all(&self) -> RegistryResult<usize> {
        let removed =
            self.backend.clear_range(prefix_range(Table::Tickets.prefix().as_bytes())).await?;
        tracing::info!(removed, "all tickets removed");
        Ok(removed)
    }

    fn now(&self) -> DateTime<Utc> {
        self.backend.now()
    }
}

/// Lazy iterator returned by [`TicketRegistry::get_all`].
///
/// Holds the rows present when `get_all` ran. Each item is decoded and
/// cipher-verified only when the iterator reaches it, so one corrupt row
/// yields one `Err` without ending the iteration.
#[derive(Debug)]
pub struct TicketIter {
    rows: std::vec::IntoIter<KeyValue>,
    cipher: Arc<dyn PayloadCipher>,
    filter: TypeFilter,
}

impl Iterator for TicketIter {
    type Item = RegistryResult<Ticket>;

    fn next(&mut self) -> Option<Self::Item> {
        for KeyValue { key, value } in self.rows.by_ref() {
            match RowHeader::decode(&key, &value) {
                Ok(header) if !self.filter.matches(&header.ticket_type) => {},
                Ok(_) => return Some(row::decode(&key, &value, self.cipher.as_ref())),
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.rows.len()))
    }
}

impl FusedIterator for TicketIter {}
