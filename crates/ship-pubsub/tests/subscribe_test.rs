//! Integration tests for subscription workers.

mod common;

use std::sync::Arc;

use ship_core::error::ShipError;
use ship_core::registry::EventRegistry;
use ship_pubsub::{ClientConfig, PubSub, WorkerState};
use ship_test_support::{
    FailingHandler, FailingTransport, PanickingHandler, RecordingHandler, RecordingRawHandler,
    envelope,
};

const ACCOUNT_OPENED: &[u8] = include_bytes!("fixtures/account_opened.json");

#[tokio::test]
async fn test_subscribe_delivers_and_acks() {
    // Arrange
    let transport = common::broker().await;
    let client = common::client(&transport);
    let handler = Arc::new(RecordingHandler::new());
    let id = transport.inject(common::SUBSCRIPTION, ACCOUNT_OPENED).unwrap();

    // Act
    let handle = client
        .subscribe(common::SUBSCRIPTION, Arc::clone(&handler) as _)
        .await
        .unwrap();

    // Assert
    assert_eq!(handle.name(), common::SUBSCRIPTION);
    assert!(common::eventually(|| transport.acked() == vec![id.clone()]).await);
    assert_eq!(handler.calls(), 1);
    assert_eq!(handler.received()[0].event_type, "AccountOpened");
    assert_eq!(handle.state(), WorkerState::Listening);

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_data_failures_are_acked_and_skip_handler() {
    // Arrange
    let transport = common::broker().await;
    let client = common::client(&transport);
    let handler = Arc::new(RecordingHandler::new());
    transport.inject(common::SUBSCRIPTION, b"{not json".to_vec()).unwrap();
    transport
        .inject(common::SUBSCRIPTION, envelope("m-1", "", "acct-1", "{}"))
        .unwrap();
    transport
        .inject(
            common::SUBSCRIPTION,
            envelope("m-2", "AccountClosed", "acct-1", "{}"),
        )
        .unwrap();
    transport
        .inject(
            common::SUBSCRIPTION,
            include_bytes!("fixtures/invalid_data.json").to_vec(),
        )
        .unwrap();

    // Act
    client
        .subscribe(common::SUBSCRIPTION, Arc::clone(&handler) as _)
        .await
        .unwrap();

    // Assert
    assert!(common::eventually(|| transport.acked().len() == 4).await);
    assert_eq!(handler.calls(), 0);
    assert!(transport.nacked().is_empty());

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_handler_error_is_nacked_once() {
    // Arrange
    let transport = common::broker_without_redelivery().await;
    let client = common::client(&transport);
    let handler = Arc::new(FailingHandler::new());
    let id = transport.inject(common::SUBSCRIPTION, ACCOUNT_OPENED).unwrap();

    // Act
    let handle = client
        .subscribe(common::SUBSCRIPTION, Arc::clone(&handler) as _)
        .await
        .unwrap();

    // Assert
    assert!(common::eventually(|| transport.nacked() == vec![id.clone()]).await);
    assert_eq!(handler.calls(), 1);
    assert!(transport.acked().is_empty());
    assert!(!handle.is_cancelled());

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_handler_panic_nacks_and_cancels_only_its_subscription() {
    // Arrange
    let transport = common::broker().await;
    transport
        .create_subscription("accounts-billing", common::TOPIC)
        .unwrap();
    let client = common::client(&transport);
    let panicking = Arc::new(PanickingHandler::new());
    let recording = Arc::new(RecordingHandler::new());
    transport.inject(common::SUBSCRIPTION, ACCOUNT_OPENED).unwrap();
    transport.inject(common::SUBSCRIPTION, ACCOUNT_OPENED).unwrap();

    // Act
    let panicked = client
        .subscribe(common::SUBSCRIPTION, Arc::clone(&panicking) as _)
        .await
        .unwrap();
    let healthy = client
        .subscribe("accounts-billing", Arc::clone(&recording) as _)
        .await
        .unwrap();
    panicked.stopped().await;
    transport.inject("accounts-billing", ACCOUNT_OPENED).unwrap();

    // Assert
    assert_eq!(panicking.calls(), 1);
    assert_eq!(transport.nacked().len(), 1);
    assert!(panicked.is_cancelled());
    assert_eq!(panicked.state(), WorkerState::Stopped);
    assert!(common::eventually(|| recording.calls() == 1).await);
    assert!(!healthy.is_cancelled());
    assert!(!client.is_stopped());

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_subscribe_to_missing_subscription_fails() {
    let transport = common::broker().await;
    let client = common::client(&transport);

    let err = client
        .subscribe("ghost", Arc::new(RecordingHandler::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, ShipError::SubscriptionMissing(ref name) if name == "ghost"));
    assert_eq!(client.in_flight_workers(), 0);
}

#[tokio::test]
async fn test_subscribe_propagates_existence_check_failure() {
    ship_test_support::init_tracing();
    let client = PubSub::new(
        Arc::new(FailingTransport),
        Arc::new(EventRegistry::new()),
        ClientConfig::new("test-project"),
    );

    let err = client
        .subscribe("accounts-audit", Arc::new(RecordingHandler::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, ShipError::Transport(_)));
}

#[tokio::test]
async fn test_published_messages_reach_raw_subscriber() {
    // Arrange
    let transport = common::broker().await;
    let client = common::client(&transport);
    let handler = Arc::new(RecordingRawHandler::new());
    client
        .subscribe_raw(common::SUBSCRIPTION, Arc::clone(&handler) as _)
        .await
        .unwrap();
    let message = ship_core::message::Message::new(
        ship_test_support::AccountOpened {
            owner: "Ada".to_owned(),
            currency: "EUR".to_owned(),
        },
        "acct-7",
        "Account",
        1,
        &ship_test_support::FixedClock::epoch(),
    );

    // Act
    let id = client.publish(common::TOPIC, &message).await.unwrap();

    // Assert
    assert!(common::eventually(|| handler.received().len() == 1).await);
    let received = handler.received();
    assert_eq!(received[0].id, id);
    assert_eq!(received[0].data, message.data.to_json().unwrap());

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_handle_stops_only_that_worker() {
    let transport = common::broker().await;
    let client = common::client(&transport);
    let handle = client
        .subscribe(common::SUBSCRIPTION, Arc::new(RecordingHandler::new()))
        .await
        .unwrap();

    handle.cancel();
    handle.stopped().await;

    assert_eq!(handle.state(), WorkerState::Stopped);
    assert!(common::eventually(|| client.in_flight_workers() == 0).await);
    assert!(!client.is_stopped());
}
