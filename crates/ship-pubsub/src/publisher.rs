//! Publishing side of [`PubSub`].

use std::collections::hash_map::Entry;
use std::sync::{Arc, PoisonError};

use tracing::{debug, error, info};

use ship_core::error::ShipError;
use ship_core::message::Message;
use ship_core::transport::{OutgoingMessage, TopicHandle, TopicOptions};

use crate::client::PubSub;

impl PubSub {
    /// Checks that every named topic exists, creating missing ones when
    /// topic creation is enabled, and caches a handle for each. Empty names
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ShipError::TopicMissing`] for a missing topic when creation
    /// is disabled, or [`ShipError::Transport`] if the broker fails.
    pub async fn ensure_topics(&self, topics: &[&str]) -> Result<(), ShipError> {
        self.ensure_running()?;

        for topic in topics.iter().copied().filter(|topic| !topic.is_empty()) {
            self.topic_init(topic).await?;
            self.topic_handle(topic)?;
        }
        Ok(())
    }

    async fn topic_init(&self, topic: &str) -> Result<(), ShipError> {
        info!(topic, "checking if topic exists");
        if self.transport.topic_exists(topic).await? {
            return Ok(());
        }

        if !self.config.create_topic {
            return Err(ShipError::TopicMissing(topic.to_owned()));
        }

        info!(topic, "creating topic");
        self.transport.create_topic(topic).await?;
        Ok(())
    }

    /// Returns the cached handle for `topic`, creating it at most once.
    fn topic_handle(&self, topic: &str) -> Result<Arc<dyn TopicHandle>, ShipError> {
        if let Some(handle) = self
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
        {
            return Ok(Arc::clone(handle));
        }

        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        // No new handles once stop has drained the cache.
        self.ensure_running()?;

        let handle = match topics.entry(topic.to_owned()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                debug!(topic, "topic is not cached, caching it");
                let handle = self.transport.topic(
                    topic,
                    TopicOptions {
                        enable_message_ordering: true,
                    },
                );
                Arc::clone(entry.insert(handle))
            }
        };
        Ok(handle)
    }

    /// Publishes `message` to `topic` and returns the broker-assigned id.
    ///
    /// The event payload becomes the message body and the metadata becomes
    /// broker attributes. Waits for the broker's confirmation; the wait ends
    /// early only if the client is stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ShipError::Serialization`] if the payload cannot be
    /// serialized, [`ShipError::Transport`] if the broker does not confirm
    /// the message, and [`ShipError::Stopped`] / [`ShipError::Cancelled`]
    /// around shutdown.
    pub async fn publish(&self, topic: &str, message: &Message) -> Result<String, ShipError> {
        self.ensure_running()?;
        let handle = self.topic_handle(topic)?;

        debug!(topic, event_type = %message.event_type, "publishing message to topic");
        let outgoing = OutgoingMessage {
            data: message.data.to_json()?,
            attributes: message.metadata.clone().into_inner(),
            ordering_key: String::new(),
        };

        debug!(topic, "checking if message was published successfully");
        let confirmation = tokio::select! {
            confirmation = handle.publish(outgoing) => confirmation,
            () = self.shutdown.cancelled() => return Err(ShipError::Cancelled),
        };

        match confirmation {
            Ok(id) => {
                debug!(topic, message_id = %message.id, transport_message_id = %id, "message published");
                Ok(id)
            }
            Err(err) => {
                error!(topic, message_id = %message.id, error = %err, "unable to publish message");
                Err(err.into())
            }
        }
    }

    /// Publishes `messages` to `topic` in order, stopping at the first
    /// failure. Returns the broker ids.
    ///
    /// # Errors
    ///
    /// Returns the first error [`PubSub::publish`] reports.
    pub async fn publish_all(
        &self,
        topic: &str,
        messages: &[Message],
    ) -> Result<Vec<String>, ShipError> {
        let mut ids = Vec::with_capacity(messages.len());
        for message in messages {
            ids.push(self.publish(topic, message).await?);
        }
        Ok(ids)
    }
}
