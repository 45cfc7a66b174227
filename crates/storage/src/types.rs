//! Common types used across storage operations.

use bytes::Bytes;

/// Key-value pair returned from range queries.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use ticket_registry_storage::KeyValue;
///
/// let kv = KeyValue {
///     key: Bytes::from("tickets/TGT-1"),
///     value: Bytes::from(r#"{"id":"TGT-1"}"#),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// The key identifying this entry.
    pub key: Bytes,

    /// The value stored at this key.
    pub value: Bytes,
}

impl KeyValue {
    /// Creates a new key-value pair.
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// The logical tables of the shared store.
///
/// Rows are addressed as `{table}/{primary key}`; the primary key is the
/// lease name or the ticket id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// `leases(name PK, owner, expires_at)`
    Leases,
    /// `tickets(id PK, type, payload, expiry_meta)`
    Tickets,
}

impl Table {
    /// Key prefix shared by every row of the table, including the separator.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Leases => "leases/",
            Self::Tickets => "tickets/",
        }
    }

    /// Builds the storage key for `primary_key` in this table.
    ///
    /// ```
    /// use ticket_registry_storage::Table;
    ///
    /// assert_eq!(Table::Tickets.key("ST-1"), b"tickets/ST-1".to_vec());
    /// ```
    #[must_use]
    pub fn key(self, primary_key: &str) -> Vec<u8> {
        let prefix = self.prefix();
        let mut key = Vec::with_capacity(prefix.len() + primary_key.len());
        key.extend_from_slice(prefix.as_bytes());
        key.extend_from_slice(primary_key.as_bytes());
        key
    }

    /// Recovers the primary key from a storage key of this table.
    ///
    /// Returns `None` when the key belongs to a different table or is not UTF-8.
    #[must_use]
    pub fn primary_key(self, key: &[u8]) -> Option<&str> {
        key.strip_prefix(self.prefix().as_bytes()).and_then(|rest| std::str::from_utf8(rest).ok())
    }
}
