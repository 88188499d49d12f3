//! Per-message dispatch pipeline.
//!
//! Every delivered message goes through decode, type check, registry
//! resolve, payload decode and handler invocation. The first stage that
//! fails decides the [`Outcome`], and the outcome decides how the delivery
//! is settled:
//!
//! | Outcome           | Settlement                        |
//! |-------------------|-----------------------------------|
//! | `Malformed`       | ack (drop)                        |
//! | `MissingType`     | ack (drop)                        |
//! | `Unregistered`    | ack (drop), warn                  |
//! | `PayloadMismatch` | ack (drop)                        |
//! | `HandlerFailed`   | nack (redeliver)                  |
//! | `HandlerPanicked` | nack, then cancel the subscription |
//! | `Handled`         | ack                               |
//!
//! Data-shaped failures never succeed on retry, so they are dropped instead
//! of looping. Handler errors are treated as transient. A handler panic is a
//! bug; the subscription stops so the rest of the process keeps running.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, warn};

use ship_core::handler::{MessageHandler, RawMessageHandler};
use ship_core::message::{Message, Metadata, RawMessage};
use ship_core::registry::EventRegistry;

use crate::envelope;

/// Result of running one message through a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The bytes are not a valid envelope.
    Malformed,
    /// The envelope has an empty `type`.
    MissingType,
    /// The envelope's `type` is not registered.
    Unregistered,
    /// The embedded data does not decode into the registered type.
    PayloadMismatch,
    /// The handler returned an error.
    HandlerFailed,
    /// The handler panicked.
    HandlerPanicked,
    /// The handler succeeded.
    Handled,
}

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge.
    Ack,
    /// Negative-acknowledge.
    Nack,
    /// Negative-acknowledge and stop the subscription.
    NackAndCancel,
}

impl Outcome {
    /// Maps the outcome to its settlement.
    #[must_use]
    pub fn disposition(self) -> Disposition {
        match self {
            Self::Malformed
            | Self::MissingType
            | Self::Unregistered
            | Self::PayloadMismatch
            | Self::Handled => Disposition::Ack,
            Self::HandlerFailed => Disposition::Nack,
            Self::HandlerPanicked => Disposition::NackAndCancel,
        }
    }

    /// Returns `true` if the handler was called.
    #[must_use]
    pub fn reached_handler(self) -> bool {
        matches!(
            self,
            Self::Handled | Self::HandlerFailed | Self::HandlerPanicked
        )
    }
}

/// A pipeline turning raw deliveries into handler calls.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Processes one raw message.
    async fn process(&self, message: &RawMessage) -> Outcome;

    /// Name of the handler behind the pipeline.
    fn handler_name(&self) -> &str;
}

/// Decodes envelopes into typed [`Message`]s for a [`MessageHandler`].
pub struct EventPipeline {
    subscription: String,
    registry: Arc<EventRegistry>,
    handler: Arc<dyn MessageHandler>,
}

impl EventPipeline {
    /// Creates a pipeline for `subscription`.
    pub fn new(
        subscription: impl Into<String>,
        registry: Arc<EventRegistry>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            subscription: subscription.into(),
            registry,
            handler,
        }
    }
}

#[async_trait]
impl Dispatch for EventPipeline {
    async fn process(&self, raw: &RawMessage) -> Outcome {
        let handler = self.handler.name();

        debug!(transport_message_id = %raw.id, "unmarshaling received message");
        let envelope = match envelope::decode(&raw.data) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(
                    subscription = %self.subscription,
                    handler,
                    transport_message_id = %raw.id,
                    error = %err,
                    "unable to unmarshal received message: acking it, so we don't process it again"
                );
                return Outcome::Malformed;
            }
        };
        let payload = envelope.payload;

        if payload.event_type.is_empty() {
            error!(
                subscription = %self.subscription,
                handler,
                transport_message_id = %raw.id,
                message_id = %payload.id,
                "empty event type: acking it so, we don't process it again"
            );
            return Outcome::MissingType;
        }

        debug!(event_type = %payload.event_type, "getting event from registry");
        let mut event = match self.registry.resolve(&payload.event_type) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    subscription = %self.subscription,
                    handler,
                    event_type = %payload.event_type,
                    message_id = %payload.id,
                    error = %err,
                    "event is not registered: replay the event for reprocessing, acking it for now"
                );
                return Outcome::Unregistered;
            }
        };

        debug!(event_type = %payload.event_type, "unmarshaling payload data");
        if let Err(err) = event.load_json(payload.data.as_bytes()) {
            if err.is_data() {
                error!(
                    subscription = %self.subscription,
                    handler,
                    event_type = %payload.event_type,
                    message_id = %payload.id,
                    error = %err,
                    "[BUG]: invalid field type in event data: replay the event for reprocessing, acking it for now"
                );
            } else {
                error!(
                    subscription = %self.subscription,
                    handler,
                    event_type = %payload.event_type,
                    message_id = %payload.id,
                    error = %err,
                    "unable to unmarshal event data: acking it"
                );
            }
            return Outcome::PayloadMismatch;
        }

        let event_type = payload.event_type.clone();
        let message_id = payload.id.clone();
        let message = Message {
            id: payload.id,
            metadata: Metadata::from(payload.metadata),
            event_type: payload.event_type,
            aggregate_id: payload.aggregate_id,
            aggregate_type: payload.aggregate_type,
            data: event,
            at: payload.at,
            version: payload.version,
        };

        debug!(event_type = %event_type, handler, "sending message to the handler");
        let invocation = AssertUnwindSafe(async { self.handler.handle_message(message).await })
            .catch_unwind()
            .await;

        match invocation {
            Ok(Ok(())) => {
                debug!(
                    event_type = %event_type,
                    handler,
                    transport_message_id = %raw.id,
                    message_id = %message_id,
                    "acknowledging msg with event type: {event_type}"
                );
                Outcome::Handled
            }
            Ok(Err(err)) => {
                error!(
                    subscription = %self.subscription,
                    handler,
                    event_type = %event_type,
                    message_id = %message_id,
                    error = %err,
                    "handler could not process message"
                );
                Outcome::HandlerFailed
            }
            Err(panic) => {
                error!(
                    subscription = %self.subscription,
                    handler,
                    transport_message_id = %raw.id,
                    message_id = %message_id,
                    panic = %panic_message(panic.as_ref()),
                    "[BUG]: recovered from a panic in subscription. Nacking the received message and removing the subscription from listening"
                );
                Outcome::HandlerPanicked
            }
        }
    }

    fn handler_name(&self) -> &str {
        self.handler.name()
    }
}

/// Hands raw deliveries to a [`RawMessageHandler`] without decoding.
pub struct RawPipeline {
    subscription: String,
    handler: Arc<dyn RawMessageHandler>,
}

impl RawPipeline {
    /// Creates a raw pipeline for `subscription`.
    pub fn new(subscription: impl Into<String>, handler: Arc<dyn RawMessageHandler>) -> Self {
        Self {
            subscription: subscription.into(),
            handler,
        }
    }
}

#[async_trait]
impl Dispatch for RawPipeline {
    async fn process(&self, raw: &RawMessage) -> Outcome {
        let handler = self.handler.name();

        let invocation = AssertUnwindSafe(async { self.handler.handle_raw_message(raw).await })
            .catch_unwind()
            .await;

        match invocation {
            Ok(Ok(())) => {
                debug!(handler, transport_message_id = %raw.id, "acknowledging raw message");
                Outcome::Handled
            }
            Ok(Err(err)) => {
                error!(
                    subscription = %self.subscription,
                    handler,
                    transport_message_id = %raw.id,
                    error = %err,
                    "raw handler could not process message"
                );
                Outcome::HandlerFailed
            }
            Err(panic) => {
                error!(
                    subscription = %self.subscription,
                    handler,
                    transport_message_id = %raw.id,
                    panic = %panic_message(panic.as_ref()),
                    "[BUG]: recovered from a panic in raw subscription. Nacking the received message and removing the subscription from listening"
                );
                Outcome::HandlerPanicked
            }
        }
    }

    fn handler_name(&self) -> &str {
        self.handler.name()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
