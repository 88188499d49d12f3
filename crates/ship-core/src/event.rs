//! Event abstractions.

use std::any::Any;
use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A typed domain occurrence carried as the payload of a [`Message`].
///
/// The trait is object safe so the dispatch pipeline can hold events it
/// only knows by name. Concrete types normally get it through
/// [`NamedEvent`].
///
/// [`Message`]: crate::message::Message
pub trait Event: Send + Sync + Debug {
    /// Returns the name the event is registered under.
    fn name(&self) -> &'static str;

    /// Serializes the event payload to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the payload cannot be serialized.
    fn to_json(&self) -> Result<Vec<u8>, serde_json::Error>;

    /// Replaces `self` with the event decoded from `data`.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if `data` does not describe this type.
    fn load_json(&mut self, data: &[u8]) -> Result<(), serde_json::Error>;

    /// Returns an owned copy of the event.
    fn clone_event(&self) -> Box<dyn Event>;

    /// Exposes the concrete value for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn Event> {
    fn clone(&self) -> Self {
        self.clone_event()
    }
}

/// A concrete event type with a fixed registered name.
///
/// Producers leave zero-valued fields out of the payload, so event types
/// must accept omitted fields: derive `Deserialize` with container-level
/// `#[serde(default)]`.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use ship_core::event::{Event, NamedEvent};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// #[serde(default)]
/// struct AccountOpened {
///     owner: String,
///     currency: String,
/// }
///
/// impl NamedEvent for AccountOpened {
///     const NAME: &'static str = "account.opened";
/// }
///
/// let mut event = AccountOpened::default();
/// event.load_json(br#"{"owner":"Ada"}"#).unwrap();
/// assert_eq!(event.name(), "account.opened");
/// assert!(event.currency.is_empty());
/// ```
pub trait NamedEvent:
    Serialize + DeserializeOwned + Default + Clone + Debug + Send + Sync + 'static
{
    /// Registered event name.
    const NAME: &'static str;
}

impl<E: NamedEvent> Event for E {
    fn name(&self) -> &'static str {
        E::NAME
    }

    fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn load_json(&mut self, data: &[u8]) -> Result<(), serde_json::Error> {
        *self = serde_json::from_slice(data)?;
        Ok(())
    }

    fn clone_event(&self) -> Box<dyn Event> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
