//! Integration tests for client shutdown and the receive-error channel.

mod common;

use std::sync::Arc;
use std::time::Duration;

use ship_core::error::{ShipError, TransportError};
use ship_pubsub::{ClientConfig, WorkerState};
use ship_test_support::{RecordingHandler, SlowHandler};

const ACCOUNT_OPENED: &[u8] = include_bytes!("fixtures/account_opened.json");

#[tokio::test]
async fn test_stop_waits_for_in_flight_handler() {
    // Arrange
    let transport = common::broker().await;
    let client = common::client(&transport);
    let handler = Arc::new(SlowHandler::new(Duration::from_millis(200)));
    transport.inject(common::SUBSCRIPTION, ACCOUNT_OPENED).unwrap();
    let handle = client
        .subscribe(common::SUBSCRIPTION, Arc::clone(&handler) as _)
        .await
        .unwrap();
    assert!(common::eventually(|| handler.started() == 1).await);

    // Act
    client.stop().await.unwrap();

    // Assert
    assert_eq!(handler.completed(), 1);
    assert_eq!(transport.acked().len(), 1);
    assert_eq!(client.in_flight_workers(), 0);
    assert_eq!(handle.state(), WorkerState::Stopped);
    assert!(transport.is_closed());
}

#[tokio::test]
async fn test_stop_stops_cached_topic_handles() {
    let transport = common::broker().await;
    let client = common::client(&transport);
    client.ensure_topics(&[common::TOPIC]).await.unwrap();

    client.stop().await.unwrap();

    assert_eq!(transport.topic_handles_stopped(), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let transport = common::broker().await;
    let client = common::client(&transport);
    client
        .subscribe(common::SUBSCRIPTION, Arc::new(RecordingHandler::new()))
        .await
        .unwrap();

    client.stop().await.unwrap();
    client.stop().await.unwrap();

    assert!(client.is_stopped());
    assert_eq!(client.in_flight_workers(), 0);
}

#[tokio::test]
async fn test_calls_after_stop_are_rejected() {
    // Arrange
    let transport = common::broker().await;
    let client = common::client(&transport);
    client.stop().await.unwrap();
    let message = ship_core::message::Message::new(
        ship_test_support::AccountOpened::default(),
        "acct-7",
        "Account",
        1,
        &ship_test_support::FixedClock::epoch(),
    );

    // Act
    let published = client.publish(common::TOPIC, &message).await;
    let subscribed = client
        .subscribe(common::SUBSCRIPTION, Arc::new(RecordingHandler::new()))
        .await;
    let ensured = client.ensure_topics(&[common::TOPIC]).await;

    // Assert
    assert!(matches!(published, Err(ShipError::Stopped)));
    assert!(matches!(subscribed, Err(ShipError::Stopped)));
    assert!(matches!(ensured, Err(ShipError::Stopped)));
}

#[tokio::test]
async fn test_receive_failure_is_reported_on_error_channel() {
    // Arrange
    let transport = common::broker().await;
    transport.fail_receives(true);
    let client = common::client(&transport);
    let mut errors = client.take_receive_errors().unwrap();

    // Act
    let handle = client
        .subscribe(common::SUBSCRIPTION, Arc::new(RecordingHandler::new()))
        .await
        .unwrap();
    handle.stopped().await;

    // Assert
    let err = errors.recv().await.unwrap();
    assert!(matches!(
        err,
        ShipError::Transport(TransportError::Unavailable(_))
    ));
    assert_eq!(handle.state(), WorkerState::Stopped);
    assert!(client.take_receive_errors().is_none());
    assert!(!client.is_stopped());
}

#[tokio::test]
async fn test_receive_errors_beyond_buffer_are_dropped() {
    // Arrange
    let transport = common::broker().await;
    transport
        .create_subscription("accounts-billing", common::TOPIC)
        .unwrap();
    transport.fail_receives(true);
    let client = common::client_with(
        &transport,
        ClientConfig::new("test-project").with_error_buffer(1),
    );
    let mut errors = client.take_receive_errors().unwrap();

    // Act
    let first = client
        .subscribe(common::SUBSCRIPTION, Arc::new(RecordingHandler::new()))
        .await
        .unwrap();
    let second = client
        .subscribe("accounts-billing", Arc::new(RecordingHandler::new()))
        .await
        .unwrap();
    first.stopped().await;
    second.stopped().await;

    // Assert
    assert!(errors.try_recv().is_ok());
    assert!(errors.try_recv().is_err());
}
