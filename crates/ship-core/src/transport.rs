//! Broker client abstraction.
//!
//! The publish/subscribe broker is an external collaborator. This module
//! names the calls the client makes on it: existence checks, topic creation,
//! topic handles for publishing, and a callback-driven receive loop whose
//! deliveries are acknowledged or negative-acknowledged one by one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::message::RawMessage;

/// Options applied when a topic handle is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicOptions {
    /// Publish messages with the same ordering key in order.
    pub enable_message_ordering: bool,
}

impl Default for TopicOptions {
    fn default() -> Self {
        Self {
            enable_message_ordering: true,
        }
    }
}

/// A message on its way to the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Serialized event payload.
    pub data: Vec<u8>,
    /// Message metadata as broker attributes.
    pub attributes: HashMap<String, String>,
    /// Ordering key. Empty means unordered.
    pub ordering_key: String,
}

/// A publishing handle for one topic. Handles are expensive to create and
/// are meant to be reused.
#[async_trait]
pub trait TopicHandle: Send + Sync {
    /// Topic name.
    fn name(&self) -> &str;

    /// Sends `message` and waits for the broker-assigned id.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the broker does not confirm the
    /// message.
    async fn publish(&self, message: OutgoingMessage) -> Result<String, TransportError>;

    /// Flushes pending sends and releases the handle's resources.
    async fn stop(&self);
}

/// Settles one delivery with the broker.
pub trait AckReply: Send {
    /// Marks the delivery consumed.
    fn ack(self: Box<Self>);

    /// Requests redelivery.
    fn nack(self: Box<Self>);
}

/// A raw message handed to a receive callback, settled exactly once through
/// [`Delivery::ack`] or [`Delivery::nack`]. Dropping a delivery without
/// settling it leaves redelivery to the broker's lease expiry.
pub struct Delivery {
    message: RawMessage,
    reply: Box<dyn AckReply>,
}

impl Delivery {
    /// Pairs a message with the reply used to settle it.
    pub fn new(message: RawMessage, reply: impl AckReply + 'static) -> Self {
        Self {
            message,
            reply: Box::new(reply),
        }
    }

    /// The delivered message.
    #[must_use]
    pub fn message(&self) -> &RawMessage {
        &self.message
    }

    /// Acknowledges the delivery.
    pub fn ack(self) {
        self.reply.ack();
    }

    /// Negative-acknowledges the delivery.
    pub fn nack(self) {
        self.reply.nack();
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Callback invoked by [`Transport::receive`] for every delivery.
pub type DeliveryCallback = Arc<dyn Fn(Delivery) -> BoxFuture<'static, ()> + Send + Sync>;

/// Client of the external publish/subscribe broker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns whether the topic exists.
    async fn topic_exists(&self, name: &str) -> Result<bool, TransportError>;

    /// Creates the topic.
    async fn create_topic(&self, name: &str) -> Result<(), TransportError>;

    /// Returns whether the subscription exists.
    async fn subscription_exists(&self, name: &str) -> Result<bool, TransportError>;

    /// Creates a publishing handle for `name`. Does not contact the broker.
    fn topic(&self, name: &str, options: TopicOptions) -> Arc<dyn TopicHandle>;

    /// Delivers messages from `subscription` to `callback` until `cancel`
    /// fires. Returns once outstanding callbacks have completed. The broker
    /// decides how many callbacks run concurrently.
    async fn receive(
        &self,
        subscription: &str,
        cancel: CancellationToken,
        callback: DeliveryCallback,
    ) -> Result<(), TransportError>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), TransportError>;
}
