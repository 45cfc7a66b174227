//! Statically declared ticket types.
//!
//! The registry never inspects payloads; the catalog is only consulted to
//! reject tickets whose type discriminator nobody registered.

use std::collections::BTreeMap;

/// Ticket-granting ticket.
pub const TICKET_GRANTING_TICKET: &str = "TGT";
/// Service ticket.
pub const SERVICE_TICKET: &str = "ST";
/// Proxy-granting ticket.
pub const PROXY_GRANTING_TICKET: &str = "PGT";
/// Proxy ticket.
pub const PROXY_TICKET: &str = "PT";
/// Transient session ticket.
pub const TRANSIENT_SESSION_TICKET: &str = "TST";

/// One registered ticket type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketDefinition {
    /// Type discriminator, also the id prefix (`ST` for `ST-1-abc`).
    pub prefix: String,
    /// Human-readable name for logs.
    pub name: String,
}

impl TicketDefinition {
    /// Creates a definition.
    #[must_use]
    pub fn new(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), name: name.into() }
    }
}

/// Lookup table of known ticket types.
///
/// ```
/// use ticket_registry::{TicketCatalog, TicketDefinition};
///
/// let mut catalog = TicketCatalog::standard();
/// assert!(catalog.contains("TGT"));
/// assert!(!catalog.contains("OC"));
///
/// catalog.register(TicketDefinition::new("OC", "OAuth code"));
/// assert_eq!(catalog.find_by_id("OC-1-xyz").map(|d| d.name.as_str()), Some("OAuth code"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TicketCatalog {
    definitions: BTreeMap<String, TicketDefinition>,
}

impl TicketCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding the standard CAS ticket types.
    #[must_use]
    pub fn standard() -> Self {
        [
            (TICKET_GRANTING_TICKET, "Ticket-granting ticket"),
            (SERVICE_TICKET, "Service ticket"),
            (PROXY_GRANTING_TICKET, "Proxy-granting ticket"),
            (PROXY_TICKET, "Proxy ticket"),
            (TRANSIENT_SESSION_TICKET, "Transient session ticket"),
        ]
        .into_iter()
        .map(|(prefix, name)| TicketDefinition::new(prefix, name))
        .collect()
    }

    /// Adds or replaces a definition.
    pub fn register(&mut self, definition: TicketDefinition) {
        self.definitions.insert(definition.prefix.clone(), definition);
    }

    /// Looks up a definition by type discriminator.
    #[must_use]
    pub fn find(&self, ticket_type: &str) -> Option<&TicketDefinition> {
        self.definitions.get(ticket_type)
    }

    /// Looks up a definition from a ticket id's prefix.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<&TicketDefinition> {
        id.split_once('-').and_then(|(prefix, _)| self.find(prefix))
    }

    /// Returns `true` if `ticket_type` is registered.
    #[must_use]
    pub fn contains(&self, ticket_type: &str) -> bool {
        self.definitions.contains_key(ticket_type)
    }

    /// Iterates definitions in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = &TicketDefinition> {
        self.definitions.values()
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` if no types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl FromIterator<TicketDefinition> for TicketCatalog {
    fn from_iter<I: IntoIterator<Item = TicketDefinition>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for definition in iter {
            catalog.register(definition);
        }
        catalog
    }
}
