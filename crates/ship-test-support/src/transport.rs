//! Test transport — a `Transport` whose every call fails.

use std::sync::Arc;

use async_trait::async_trait;
use ship_core::error::TransportError;
use ship_core::transport::{
    DeliveryCallback, OutgoingMessage, TopicHandle, TopicOptions, Transport,
};
use tokio_util::sync::CancellationToken;

const REASON: &str = "connection refused";

/// A transport that always returns [`TransportError::Unavailable`]. Useful
/// for testing error-handling paths.
#[derive(Debug)]
pub struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    async fn topic_exists(&self, _name: &str) -> Result<bool, TransportError> {
        Err(TransportError::Unavailable(REASON.into()))
    }

    async fn create_topic(&self, _name: &str) -> Result<(), TransportError> {
        Err(TransportError::Unavailable(REASON.into()))
    }

    async fn subscription_exists(&self, _name: &str) -> Result<bool, TransportError> {
        Err(TransportError::Unavailable(REASON.into()))
    }

    fn topic(&self, name: &str, _options: TopicOptions) -> Arc<dyn TopicHandle> {
        Arc::new(FailingTopic(name.to_owned()))
    }

    async fn receive(
        &self,
        _subscription: &str,
        _cancel: CancellationToken,
        _callback: DeliveryCallback,
    ) -> Result<(), TransportError> {
        Err(TransportError::Unavailable(REASON.into()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Debug)]
struct FailingTopic(String);

#[async_trait]
impl TopicHandle for FailingTopic {
    fn name(&self) -> &str {
        &self.0
    }

    async fn publish(&self, _message: OutgoingMessage) -> Result<String, TransportError> {
        Err(TransportError::Unavailable(REASON.into()))
    }

    async fn stop(&self) {}
}
