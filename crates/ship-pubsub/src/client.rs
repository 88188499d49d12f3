//! Client owning the broker connection, the topic cache and the subscription
//! workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use ship_core::error::ShipError;
use ship_core::registry::EventRegistry;
use ship_core::transport::{TopicHandle, Transport};

use crate::config::ClientConfig;

/// Publish/subscribe client.
///
/// All methods take `&self` and are safe to call concurrently, except that
/// [`PubSub::stop`] must not race with [`PubSub::subscribe`].
///
/// ```no_run
/// # use std::sync::Arc;
/// # use ship_core::handler::MessageHandler;
/// # use ship_core::registry::EventRegistry;
/// # use ship_pubsub::memory::MemoryTransport;
/// # use ship_pubsub::{ClientConfig, PubSub};
/// # async fn run(h1: Arc<dyn MessageHandler>, h2: Arc<dyn MessageHandler>) -> Result<(), ship_core::error::ShipError> {
/// let registry = Arc::new(EventRegistry::new());
/// let client = PubSub::new(
///     Arc::new(MemoryTransport::new()),
///     registry,
///     ClientConfig::new("project-id"),
/// );
///
/// client.subscribe("some-subscription-name", h1).await?;
/// client.subscribe("some-subscription-name2", h2).await?;
///
/// // Cancels every subscription and waits for in-flight handlers.
/// client.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct PubSub {
    pub(crate) config: ClientConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: Arc<EventRegistry>,
    pub(crate) topics: RwLock<HashMap<String, Arc<dyn TopicHandle>>>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) workers: TaskTracker,
    pub(crate) errors_tx: mpsc::Sender<ShipError>,
    errors_rx: Mutex<Option<mpsc::Receiver<ShipError>>>,
    pub(crate) stopped: AtomicBool,
}

impl PubSub {
    /// Creates a client over `transport`, resolving consumed event types
    /// through `registry`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<EventRegistry>,
        config: ClientConfig,
    ) -> Self {
        info!(project = %config.project_id, "creating a pubsub client");
        let (errors_tx, errors_rx) = mpsc::channel(config.error_buffer.max(1));

        Self {
            config,
            transport,
            registry,
            topics: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            workers: TaskTracker::new(),
            errors_tx,
            errors_rx: Mutex::new(Some(errors_rx)),
            stopped: AtomicBool::new(false),
        }
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The registry consumed event types are resolved through.
    #[must_use]
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Number of subscription workers that have not exited yet.
    #[must_use]
    pub fn in_flight_workers(&self) -> usize {
        self.workers.len()
    }

    /// Returns `true` once [`PubSub::stop`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Takes the receiver of errors returned by subscription receive loops.
    /// Returns `None` after the first call.
    pub fn take_receive_errors(&self) -> Option<mpsc::Receiver<ShipError>> {
        self.errors_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn ensure_running(&self) -> Result<(), ShipError> {
        if self.is_stopped() {
            return Err(ShipError::Stopped);
        }
        Ok(())
    }

    /// Stops the client gracefully.
    ///
    /// Stops and drops cached topic handles, cancels every subscription,
    /// waits until every subscription worker has exited and then closes the
    /// broker connection. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ShipError::Transport`] if closing the connection fails.
    pub async fn stop(&self) -> Result<(), ShipError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("client already stopped");
            return Ok(());
        }

        let topics: Vec<_> = self
            .topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, topic)| topic)
            .collect();
        for topic in topics {
            debug!(topic = topic.name(), "closing topic");
            topic.stop().await;
        }

        debug!("cancelling context");
        self.shutdown.cancel();

        info!(
            workers = self.workers.len(),
            "waiting for subscription to finish"
        );
        self.workers.close();
        self.workers.wait().await;

        self.transport.close().await?;
        info!("pubsub client stopped");
        Ok(())
    }
}

impl std::fmt::Debug for PubSub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSub")
            .field("config", &self.config)
            .field("workers", &self.workers.len())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
