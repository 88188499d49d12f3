//! Message model.

use std::collections::HashMap;
use std::collections::hash_map;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::event::Event;

/// String key/value pairs attached to a message (tracing ids, routing
/// hints). Stored as a single JSON object when persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(HashMap<String, String>);

impl Metadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the entries in arbitrary order.
    pub fn iter(&self) -> hash_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// Serializes the metadata to a single JSON text blob.
    #[must_use]
    pub fn to_text(&self) -> String {
        // A map of strings always serializes.
        serde_json::to_string(&self.0).unwrap_or_else(|_| String::from("{}"))
    }

    /// Parses metadata from a text blob produced by [`Metadata::to_text`].
    /// Empty or blank text yields empty metadata.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the text is not a string map.
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_json::from_str(text).map(Self)
    }

    /// Converts into the underlying map.
    #[must_use]
    pub fn into_inner(self) -> HashMap<String, String> {
        self.0
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Metadata {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

impl From<HashMap<String, String>> for Metadata {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Metadata {
    type Item = (&'a String, &'a String);
    type IntoIter = hash_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One occurrence of a domain event, as handed to handlers and publishers.
///
/// `event_type` always equals `data.name()` for messages built through
/// [`Message::new`]; the dispatch loop upholds the same for reconstructed
/// messages by resolving `data` from `event_type`.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message identifier.
    pub id: String,
    /// Cross-cutting key/value pairs.
    pub metadata: Metadata,
    /// Registered event name of `data`.
    pub event_type: String,
    /// Identifier of the aggregate the event belongs to.
    pub aggregate_id: String,
    /// Type name of the aggregate.
    pub aggregate_type: String,
    /// Typed payload.
    pub data: Box<dyn Event>,
    /// When the event occurred.
    pub at: DateTime<Utc>,
    /// Per-aggregate version, increasing monotonically.
    pub version: u64,
}

impl Message {
    /// Builds a message for `data` with a fresh identifier, stamped with the
    /// clock's current time.
    #[must_use]
    pub fn new(
        data: impl Event + 'static,
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        version: u64,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            event_type: data.name().to_owned(),
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            data: Box::new(data),
            at: clock.now(),
            version,
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// Returns the payload as `E` if that is its concrete type.
    #[must_use]
    pub fn data_as<E: Event + 'static>(&self) -> Option<&E> {
        self.data.as_any().downcast_ref::<E>()
    }

    /// Returns `true` if the payload reports the message's event type.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.data.name() == self.event_type
    }
}

/// Untyped message as delivered by the broker. Read-only to this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Broker-assigned identifier.
    pub id: String,
    /// Opaque payload.
    pub data: Vec<u8>,
    /// Broker attributes.
    pub attributes: HashMap<String, String>,
    /// When the broker accepted the message.
    pub publish_time: DateTime<Utc>,
    /// Ordering key, if the publisher set one.
    pub ordering_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde::Deserialize;

    use super::*;
    use crate::clock::Clock;
    use crate::event::NamedEvent;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct OrderPlaced {
        order_id: String,
    }

    impl NamedEvent for OrderPlaced {
        const NAME: &'static str = "order.placed";
    }

    struct StaticClock(DateTime<Utc>);

    impl Clock for StaticClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn test_new_message_takes_type_from_event() {
        // Arrange
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let clock = StaticClock(now);

        // Act
        let message = Message::new(
            OrderPlaced {
                order_id: "o-1".into(),
            },
            "agg-1",
            "Order",
            3,
            &clock,
        )
        .with_metadata("trace_id", "t-1");

        // Assert
        assert_eq!(message.event_type, "order.placed");
        assert!(message.is_consistent());
        assert_eq!(message.aggregate_id, "agg-1");
        assert_eq!(message.aggregate_type, "Order");
        assert_eq!(message.version, 3);
        assert_eq!(message.at, now);
        assert_eq!(message.metadata.get("trace_id"), Some("t-1"));
        assert!(Uuid::parse_str(&message.id).is_ok());
        assert_eq!(message.data_as::<OrderPlaced>().unwrap().order_id, "o-1");
    }

    #[test]
    fn test_clone_copies_metadata() {
        let clock = StaticClock(Utc::now());
        let original = Message::new(OrderPlaced::default(), "agg-1", "Order", 1, &clock)
            .with_metadata("k", "v");

        let mut copy = original.clone();
        copy.metadata.insert("k", "changed");

        assert_eq!(original.metadata.get("k"), Some("v"));
        assert_eq!(copy.metadata.get("k"), Some("changed"));
        assert_eq!(copy.id, original.id);
    }

    #[test]
    fn test_metadata_text_round_trip() {
        let metadata: Metadata = [("trace_id", "t-1"), ("tenant", "acme")]
            .into_iter()
            .collect();

        let restored = Metadata::from_text(&metadata.to_text()).unwrap();

        assert_eq!(restored, metadata);
    }

    #[test]
    fn test_metadata_from_blank_text_is_empty() {
        assert!(Metadata::from_text("").unwrap().is_empty());
        assert!("  ".parse::<Metadata>().unwrap().is_empty());
    }

    #[test]
    fn test_metadata_from_invalid_text_fails() {
        assert!(Metadata::from_text(r#"{"k": 1}"#).is_err());
        assert!(Metadata::from_text("not json").is_err());
    }
}
