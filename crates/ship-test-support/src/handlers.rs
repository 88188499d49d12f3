//! Test handlers — mock `MessageHandler` and `RawMessageHandler`
//! implementations for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ship_core::handler::{HandlerError, MessageHandler, RawMessageHandler};
use ship_core::message::{Message, RawMessage};

/// A handler that records every message it receives and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    received: Mutex<Vec<Message>>,
}

impl RecordingHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the received messages.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn received(&self) -> Vec<Message> {
        self.received.lock().unwrap().clone()
    }

    /// Number of calls so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle_message(&self, message: Message) -> Result<(), HandlerError> {
        self.received.lock().unwrap().push(message);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// A handler that always returns an error.
#[derive(Debug, Default)]
pub struct FailingHandler {
    calls: AtomicUsize,
}

impl FailingHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for FailingHandler {
    async fn handle_message(&self, _message: Message) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err("downstream unavailable".into())
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// A handler that panics on every message.
#[derive(Debug, Default)]
pub struct PanickingHandler {
    calls: AtomicUsize,
}

impl PanickingHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for PanickingHandler {
    async fn handle_message(&self, message: Message) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("handler exploded on {}", message.id);
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

/// A handler that sleeps before succeeding. Records completed calls only.
#[derive(Debug)]
pub struct SlowHandler {
    delay: Duration,
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl SlowHandler {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for SlowHandler {
    async fn handle_message(&self, _message: Message) -> Result<(), HandlerError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// A raw handler that records the bytes of every message it receives.
#[derive(Debug, Default)]
pub struct RecordingRawHandler {
    received: Mutex<Vec<RawMessage>>,
}

impl RecordingRawHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the received messages.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn received(&self) -> Vec<RawMessage> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl RawMessageHandler for RecordingRawHandler {
    async fn handle_raw_message(&self, message: &RawMessage) -> Result<(), HandlerError> {
        self.received.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording-raw"
    }
}
