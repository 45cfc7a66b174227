//! JSON encoding of `tickets/{id}` rows.
//!
//! The denormalized `expires_at` column lets sweeps and type filters read a
//! [`RowHeader`] without decoding the payload or touching the cipher.
//! The `encrypted` column records whether the payload was sealed, so a
//! registry configured with a different cipher refuses the row instead of
//! handing back the wrong bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExpirationPolicy, Ticket};
use crate::{
    cipher::{CipherError, PayloadCipher},
    error::{RegistryError, RegistryResult},
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TicketRow {
    id: String,
    #[serde(rename = "type")]
    ticket_type: String,
    #[serde(with = "base64_payload")]
    payload: Vec<u8>,
    #[serde(default)]
    encrypted: bool,
    expiration: ExpirationPolicy,
    expires_at: Option<DateTime<Utc>>,
}

/// The columns needed to filter or sweep a row.
#[derive(Debug, Deserialize)]
pub(crate) struct RowHeader {
    #[serde(rename = "type")]
    pub(crate) ticket_type: String,
    pub(crate) expires_at: Option<DateTime<Utc>>,
}

impl RowHeader {
    pub(crate) fn decode(key: &[u8], bytes: &[u8]) -> RegistryResult<Self> {
        serde_json::from_slice(bytes).map_err(|err| RegistryError::serialization(key, err.to_string()))
    }

    pub(crate) fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Seals the payload and serializes the row.
pub(crate) fn encode(ticket: &Ticket, cipher: &dyn PayloadCipher) -> RegistryResult<Vec<u8>> {
    let row = TicketRow {
        id: ticket.id.clone(),
        ticket_type: ticket.ticket_type.clone(),
        payload: cipher.encode(&ticket.payload)?,
        encrypted: cipher.is_enabled(),
        expiration: ticket.expiration.clone(),
        expires_at: ticket.expires_at(),
    };
    serde_json::to_vec(&row)
        .map_err(|err| RegistryError::serialization(ticket.id.as_bytes(), err.to_string()))
}

/// Parses the row and opens the payload.
///
/// Returns [`RegistryError::Integrity`] when the row was sealed and the
/// cipher is a no-op, or the other way round.
pub(crate) fn decode(
    key: &[u8],
    bytes: &[u8],
    cipher: &dyn PayloadCipher,
) -> RegistryResult<Ticket> {
    let row: TicketRow = serde_json::from_slice(bytes)
        .map_err(|err| RegistryError::serialization(key, err.to_string()))?;
    if row.encrypted != cipher.is_enabled() {
        return Err(CipherError::Integrity.into());
    }
    let payload = cipher.decode(&row.payload)?;
    Ok(Ticket {
        id: row.id,
        ticket_type: row.ticket_type,
        payload: payload.into(),
        expiration: row.expiration,
    })
}

mod base64_payload {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}
