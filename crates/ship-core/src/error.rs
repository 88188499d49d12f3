//! Error types shared by the registry, the transport boundary and the client.

use thiserror::Error;

/// Errors raised by the event registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// An event name was registered twice.
    #[error("ship: event {0} is already registered")]
    AlreadyRegistered(String),

    /// No event is registered under the requested name.
    #[error("ship: event {0} is not registered")]
    NotRegistered(String),

    /// A factory was registered under a name its event does not report.
    #[error("ship: event registered as {name} reports name {reported}")]
    NameMismatch {
        /// Name the factory was registered under.
        name: String,
        /// Name the produced event reports.
        reported: &'static str,
    },
}

/// What kind of transport resource a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A publish destination.
    Topic,
    /// A delivery channel bound to a topic.
    Subscription,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Topic => f.write_str("topic"),
            Self::Subscription => f.write_str("subscription"),
        }
    }
}

/// Failure reported by the external broker client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The broker does not know the named resource.
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind.
        kind: ResourceKind,
        /// Resource name.
        name: String,
    },

    /// The broker could not be reached or failed the call.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The broker refused the request.
    #[error("transport rejected request: {0}")]
    Rejected(String),

    /// The connection has been closed.
    #[error("transport connection closed")]
    Closed,
}

/// Top-level error returned by publish, subscribe and stop.
#[derive(Debug, Error)]
pub enum ShipError {
    /// The event payload could not be serialized.
    #[error("unable to marshal message to bytes: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker client reported a failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A topic is missing and topic creation is disabled.
    #[error("topic {0} does not exists")]
    TopicMissing(String),

    /// A subscription is missing. Subscriptions are never created here.
    #[error("subscription {0} does not exists")]
    SubscriptionMissing(String),

    /// The client has been stopped.
    #[error("client is stopped")]
    Stopped,

    /// The operation was interrupted by shutdown.
    #[error("operation cancelled")]
    Cancelled,
}
