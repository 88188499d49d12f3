//! Change-data-capture envelope decoding.
//!
//! Messages arrive wrapped the way the outbox connector emits rows:
//!
//! ```json
//! {
//!   "payload": {
//!     "id": "9b5c…", "type": "account.opened",
//!     "metadata": {"trace_id": "…"},
//!     "aggregate_id": "acc-1", "aggregate_type": "Account",
//!     "at": "2026-01-15T10:00:00Z", "version": 1,
//!     "data": "{\"owner\":\"ada\"}",
//!     "__table": "outbox", "__lsn": 42, "__deleted": "false"
//!   }
//! }
//! ```
//!
//! `data` carries the event payload as an embedded JSON string. The
//! bookkeeping fields (`__table`, `__lsn`, `__deleted`) are parsed but not
//! interpreted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// The envelope bytes could not be parsed.
#[derive(Debug, Error)]
#[error("unable to decode envelope: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Top-level wire structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdcEnvelope {
    /// The captured outbox row.
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: CdcPayload,
}

/// One captured outbox row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdcPayload {
    /// Message identifier.
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    /// Registered event name. Must be non-empty to be dispatched.
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub event_type: String,
    /// Message metadata.
    #[serde(deserialize_with = "null_as_default")]
    pub metadata: HashMap<String, String>,
    /// Aggregate identifier.
    #[serde(deserialize_with = "null_as_default")]
    pub aggregate_id: String,
    /// Aggregate type name.
    #[serde(deserialize_with = "null_as_default")]
    pub aggregate_type: String,
    /// When the event occurred.
    #[serde(deserialize_with = "null_as_default")]
    pub at: DateTime<Utc>,
    /// Per-aggregate version.
    #[serde(deserialize_with = "null_as_default")]
    pub version: u64,
    /// Serialized event payload.
    #[serde(deserialize_with = "null_as_default")]
    pub data: String,
    /// Source table of the captured row.
    #[serde(rename = "__table", deserialize_with = "null_as_default")]
    pub table: String,
    /// Log sequence number of the captured change.
    #[serde(rename = "__lsn", deserialize_with = "null_as_default")]
    pub lsn: u64,
    /// Deletion marker of the captured change.
    #[serde(rename = "__deleted", deserialize_with = "null_as_default")]
    pub deleted: String,
}

impl CdcEnvelope {
    /// Returns `true` if the envelope names an event type.
    #[must_use]
    pub fn is_dispatchable(&self) -> bool {
        !self.payload.event_type.is_empty()
    }
}

/// Parses `bytes` as a [`CdcEnvelope`]. Missing fields take their zero
/// value, and so does any field set to `null`.
///
/// # Errors
///
/// Returns [`DecodeError`] if the bytes are not a JSON object of the
/// expected shape.
pub fn decode(bytes: &[u8]) -> Result<CdcEnvelope, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
