//! Event type registry.
//!
//! Maps an event name to a factory producing a fresh zero value of the
//! registered type. Dispatch resolves incoming type names through it, so new
//! event types are added by registering them at startup without touching the
//! delivery pipeline.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::RegistryError;
use crate::event::{Event, NamedEvent};

/// Produces a zero-valued event of one concrete type.
pub type EventFactory = fn() -> Box<dyn Event>;

fn zero_value<E: NamedEvent>() -> Box<dyn Event> {
    Box::new(E::default())
}

/// Name-to-type mapping shared by the publishing and consuming sides.
///
/// Writes happen during startup (or in test and migration code), reads
/// happen on every delivered message; the map sits behind a reader/writer
/// lock.
#[derive(Debug, Default)]
pub struct EventRegistry {
    entries: RwLock<HashMap<&'static str, EventFactory>>,
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `E` under [`NamedEvent::NAME`].
    ///
    /// # Panics
    ///
    /// Panics if the name is already registered. A duplicate registration is
    /// a wiring bug and is not recoverable.
    pub fn register<E: NamedEvent>(&self) {
        self.register_factory(E::NAME, zero_value::<E>);
    }

    /// Registers an explicit factory under `name`.
    ///
    /// # Panics
    ///
    /// Panics if the name is already registered or if the factory's event
    /// reports a different name.
    pub fn register_factory(&self, name: &'static str, factory: EventFactory) {
        if let Err(err) = self.try_register(name, factory) {
            panic!("{err}");
        }
    }

    /// Registers an explicit factory under `name`, reporting conflicts.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NameMismatch`] if the factory's event
    /// reports a name other than `name`, and
    /// [`RegistryError::AlreadyRegistered`] if `name` is taken.
    pub fn try_register(
        &self,
        name: &'static str,
        factory: EventFactory,
    ) -> Result<(), RegistryError> {
        // Resolved messages take their type from the key and their data
        // from the factory; both must agree.
        let reported = factory().name();
        if reported != name {
            return Err(RegistryError::NameMismatch {
                name: name.to_owned(),
                reported,
            });
        }

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if entries.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered(name.to_owned()));
        }
        entries.insert(name, factory);
        Ok(())
    }

    /// Returns a freshly constructed zero value of the type registered under
    /// `name`. Every call allocates a new instance.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotRegistered`] for an unknown name.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn Event>, RegistryError> {
        let factory = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied();

        factory
            .map(|make| make())
            .ok_or_else(|| RegistryError::NotRegistered(name.to_owned()))
    }

    /// Removes the entry for `name`. Meant for migrations and tests.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not registered.
    pub fn unregister(&self, name: &str) {
        if let Err(err) = self.try_unregister(name) {
            panic!("{err}");
        }
    }

    /// Removes the entry for `name`, reporting a missing entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotRegistered`] if `name` is unknown.
    pub fn try_unregister(&self, name: &str) -> Result<(), RegistryError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotRegistered(name.to_owned()))
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Returns the number of registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        names.sort_unstable();
        names
    }
}
