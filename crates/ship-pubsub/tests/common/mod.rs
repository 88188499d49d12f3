//! Shared test helpers for client integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ship_pubsub::memory::MemoryTransport;
use ship_pubsub::{ClientConfig, PubSub};
use ship_test_support::sample_registry;

pub const TOPIC: &str = "accounts";
pub const SUBSCRIPTION: &str = "accounts-audit";

/// A broker with one topic and one subscription bound to it.
pub async fn broker() -> MemoryTransport {
    seed(MemoryTransport::new()).await
}

/// Same as [`broker`], with nacked messages dropped instead of requeued.
pub async fn broker_without_redelivery() -> MemoryTransport {
    seed(MemoryTransport::new().without_redelivery()).await
}

async fn seed(transport: MemoryTransport) -> MemoryTransport {
    use ship_core::transport::Transport;

    transport.create_topic(TOPIC).await.unwrap();
    transport.create_subscription(SUBSCRIPTION, TOPIC).unwrap();
    transport
}

/// A client over `transport` with the sample events registered.
pub fn client(transport: &MemoryTransport) -> PubSub {
    client_with(transport, ClientConfig::new("test-project"))
}

pub fn client_with(transport: &MemoryTransport, config: ClientConfig) -> PubSub {
    ship_test_support::init_tracing();
    PubSub::new(
        Arc::new(transport.clone()),
        Arc::new(sample_registry()),
        config,
    )
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Lets the background workers run for a moment.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
