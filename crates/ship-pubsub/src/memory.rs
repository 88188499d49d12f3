//! In-process broker implementing [`Transport`].
//!
//! Topics fan published messages out to the subscriptions bound to them.
//! Each subscription is a FIFO queue delivered one message at a time.
//! Acknowledged messages are removed; negative-acknowledged messages go to
//! the back of the queue unless redelivery is disabled. Counters record what
//! the client did so tests can assert on it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use ship_core::error::{ResourceKind, TransportError};
use ship_core::message::RawMessage;
use ship_core::transport::{
    AckReply, Delivery, DeliveryCallback, OutgoingMessage, TopicHandle, TopicOptions, Transport,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct Queue {
    pending: Mutex<VecDeque<RawMessage>>,
    notify: Notify,
}

impl Queue {
    fn push_back(&self, message: RawMessage) {
        lock(&self.pending).push_back(message);
        self.notify.notify_one();
    }

    async fn next(&self) -> RawMessage {
        loop {
            if let Some(message) = lock(&self.pending).pop_front() {
                return message;
            }
            self.notify.notified().await;
        }
    }

    fn len(&self) -> usize {
        lock(&self.pending).len()
    }
}

#[derive(Debug)]
struct Subscription {
    topic: String,
    queue: Arc<Queue>,
}

#[derive(Debug, Default)]
struct State {
    topics: HashMap<String, Vec<RawMessage>>,
    subscriptions: HashMap<String, Subscription>,
    acked: Vec<String>,
    nacked: Vec<String>,
}

#[derive(Debug)]
struct Broker {
    state: Mutex<State>,
    next_id: AtomicU64,
    redeliver: AtomicBool,
    fail_publishes: AtomicBool,
    fail_receives: AtomicBool,
    closed: AtomicBool,
    handles_created: AtomicUsize,
    handles_stopped: AtomicUsize,
}

impl Broker {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn next_id(&self) -> String {
        format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn queue(&self, subscription: &str) -> Result<Arc<Queue>, TransportError> {
        lock(&self.state)
            .subscriptions
            .get(subscription)
            .map(|sub| Arc::clone(&sub.queue))
            .ok_or_else(|| TransportError::NotFound {
                kind: ResourceKind::Subscription,
                name: subscription.to_owned(),
            })
    }

    fn publish(&self, topic: &str, message: OutgoingMessage) -> Result<String, TransportError> {
        self.ensure_open()?;
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable(format!(
                "publish to {topic} refused"
            )));
        }

        let raw = RawMessage {
            id: self.next_id(),
            data: message.data,
            attributes: message.attributes,
            publish_time: Utc::now(),
            ordering_key: Some(message.ordering_key).filter(|key| !key.is_empty()),
        };

        let mut state = lock(&self.state);
        let log = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| TransportError::NotFound {
                kind: ResourceKind::Topic,
                name: topic.to_owned(),
            })?;
        log.push(raw.clone());

        for sub in state.subscriptions.values().filter(|sub| sub.topic == topic) {
            sub.queue.push_back(raw.clone());
        }

        Ok(raw.id)
    }
}

/// In-process broker.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    broker: Arc<Broker>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Creates an empty broker with redelivery of nacked messages enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            broker: Arc::new(Broker {
                state: Mutex::new(State::default()),
                next_id: AtomicU64::new(0),
                redeliver: AtomicBool::new(true),
                fail_publishes: AtomicBool::new(false),
                fail_receives: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                handles_created: AtomicUsize::new(0),
                handles_stopped: AtomicUsize::new(0),
            }),
        }
    }

    /// Disables requeueing of nacked messages.
    #[must_use]
    pub fn without_redelivery(self) -> Self {
        self.broker.redeliver.store(false, Ordering::SeqCst);
        self
    }

    /// Makes every publish fail with [`TransportError::Unavailable`].
    pub fn fail_publishes(&self, fail: bool) {
        self.broker.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Makes every receive loop fail with [`TransportError::Unavailable`]
    /// as soon as it starts.
    pub fn fail_receives(&self, fail: bool) {
        self.broker.fail_receives.store(fail, Ordering::SeqCst);
    }

    /// Creates a subscription bound to an existing topic.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotFound`] if the topic does not exist, or
    /// [`TransportError::Rejected`] if the subscription already exists.
    pub fn create_subscription(&self, name: &str, topic: &str) -> Result<(), TransportError> {
        self.broker.ensure_open()?;
        let mut state = lock(&self.broker.state);
        if !state.topics.contains_key(topic) {
            return Err(TransportError::NotFound {
                kind: ResourceKind::Topic,
                name: topic.to_owned(),
            });
        }
        if state.subscriptions.contains_key(name) {
            return Err(TransportError::Rejected(format!(
                "subscription {name} already exists"
            )));
        }
        state.subscriptions.insert(
            name.to_owned(),
            Subscription {
                topic: topic.to_owned(),
                queue: Arc::new(Queue::default()),
            },
        );
        Ok(())
    }

    /// Queues `data` directly on a subscription, the way a change-capture
    /// connector would, and returns the broker id.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotFound`] if the subscription does not
    /// exist.
    pub fn inject(&self, subscription: &str, data: impl Into<Vec<u8>>) -> Result<String, TransportError> {
        self.broker.ensure_open()?;
        let queue = self.broker.queue(subscription)?;
        let id = self.broker.next_id();
        queue.push_back(RawMessage {
            id: id.clone(),
            data: data.into(),
            attributes: HashMap::new(),
            publish_time: Utc::now(),
            ordering_key: None,
        });
        Ok(id)
    }

    /// Messages published to `topic` so far.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<RawMessage> {
        lock(&self.broker.state)
            .topics
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of messages waiting on `subscription`.
    #[must_use]
    pub fn pending(&self, subscription: &str) -> usize {
        self.broker.queue(subscription).map_or(0, |queue| queue.len())
    }

    /// Ids of acknowledged deliveries, in settlement order.
    #[must_use]
    pub fn acked(&self) -> Vec<String> {
        lock(&self.broker.state).acked.clone()
    }

    /// Ids of negative-acknowledged deliveries, in settlement order.
    #[must_use]
    pub fn nacked(&self) -> Vec<String> {
        lock(&self.broker.state).nacked.clone()
    }

    /// Number of topic handles created through [`Transport::topic`].
    #[must_use]
    pub fn topic_handles_created(&self) -> usize {
        self.broker.handles_created.load(Ordering::SeqCst)
    }

    /// Number of topic handles stopped.
    #[must_use]
    pub fn topic_handles_stopped(&self) -> usize {
        self.broker.handles_stopped.load(Ordering::SeqCst)
    }

    /// Returns `true` once [`Transport::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.broker.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn topic_exists(&self, name: &str) -> Result<bool, TransportError> {
        self.broker.ensure_open()?;
        Ok(lock(&self.broker.state).topics.contains_key(name))
    }

    async fn create_topic(&self, name: &str) -> Result<(), TransportError> {
        self.broker.ensure_open()?;
        let mut state = lock(&self.broker.state);
        if state.topics.contains_key(name) {
            return Err(TransportError::Rejected(format!(
                "topic {name} already exists"
            )));
        }
        state.topics.insert(name.to_owned(), Vec::new());
        Ok(())
    }

    async fn subscription_exists(&self, name: &str) -> Result<bool, TransportError> {
        self.broker.ensure_open()?;
        Ok(lock(&self.broker.state).subscriptions.contains_key(name))
    }

    fn topic(&self, name: &str, options: TopicOptions) -> Arc<dyn TopicHandle> {
        self.broker.handles_created.fetch_add(1, Ordering::SeqCst);
        Arc::new(MemoryTopic {
            name: name.to_owned(),
            options,
            broker: Arc::clone(&self.broker),
        })
    }

    async fn receive(
        &self,
        subscription: &str,
        cancel: CancellationToken,
        callback: DeliveryCallback,
    ) -> Result<(), TransportError> {
        self.broker.ensure_open()?;
        if self.broker.fail_receives.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable(format!(
                "streaming pull on {subscription} refused"
            )));
        }
        let queue = self.broker.queue(subscription)?;

        loop {
            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                message = queue.next() => message,
            };

            let reply = MemoryReply {
                message: message.clone(),
                queue: Arc::clone(&queue),
                broker: Arc::clone(&self.broker),
            };
            callback(Delivery::new(message, reply)).await;
        }

        debug!(subscription, "memory receive loop finished");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.broker.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Publishing handle of the in-process broker.
#[derive(Debug)]
pub struct MemoryTopic {
    name: String,
    options: TopicOptions,
    broker: Arc<Broker>,
}

impl MemoryTopic {
    /// Options the handle was created with.
    #[must_use]
    pub fn options(&self) -> TopicOptions {
        self.options
    }
}

#[async_trait]
impl TopicHandle for MemoryTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, message: OutgoingMessage) -> Result<String, TransportError> {
        self.broker.publish(&self.name, message)
    }

    async fn stop(&self) {
        self.broker.handles_stopped.fetch_add(1, Ordering::SeqCst);
    }
}

struct MemoryReply {
    message: RawMessage,
    queue: Arc<Queue>,
    broker: Arc<Broker>,
}

impl AckReply for MemoryReply {
    fn ack(self: Box<Self>) {
        lock(&self.broker.state).acked.push(self.message.id);
    }

    fn nack(self: Box<Self>) {
        lock(&self.broker.state).nacked.push(self.message.id.clone());
        if self.broker.redeliver.load(Ordering::SeqCst) {
            self.queue.push_back(self.message);
        }
    }
}
