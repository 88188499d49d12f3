//! Sample events shared by tests.

use serde::{Deserialize, Serialize};
use ship_core::event::NamedEvent;
use ship_core::registry::EventRegistry;

/// An account was opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountOpened {
    pub owner: String,
    pub currency: String,
}

impl NamedEvent for AccountOpened {
    const NAME: &'static str = "AccountOpened";
}

/// Funds were deposited into an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundsDeposited {
    pub amount: i64,
    pub reference: String,
}

impl NamedEvent for FundsDeposited {
    const NAME: &'static str = "FundsDeposited";
}

/// A registry with every sample event registered.
#[must_use]
pub fn sample_registry() -> EventRegistry {
    let registry = EventRegistry::new();
    registry.register::<AccountOpened>();
    registry.register::<FundsDeposited>();
    registry
}

/// Builds a change-capture envelope the way the connector writes it, with
/// `data` embedded as a JSON string.
#[must_use]
pub fn envelope(id: &str, event_type: &str, aggregate_id: &str, data: &str) -> Vec<u8> {
    serde_json::json!({
        "payload": {
            "id": id,
            "type": event_type,
            "metadata": { "trace-id": "trace-1" },
            "aggregate_id": aggregate_id,
            "aggregate_type": "Account",
            "at": "2024-05-01T12:00:00Z",
            "version": 3,
            "data": data,
            "__table": "events",
            "__lsn": 42,
            "__deleted": "false"
        }
    })
    .to_string()
    .into_bytes()
}
