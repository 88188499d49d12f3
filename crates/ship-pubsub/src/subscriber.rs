//! Subscribing side of [`PubSub`].
//!
//! Each subscription runs in its own worker:
//!
//! ```text
//! Initializing ──► Listening ──► Draining ──► Stopped
//!                       └────────────────────────▲
//!                          receive loop failed
//! ```
//!
//! `subscribe` fails outright when the subscription does not exist, so a
//! returned handle starts in `Initializing` until the worker has registered
//! with the broker's receive loop. Every cancelled worker passes through
//! `Draining`, even when the receive loop returns in the same poll as the
//! cancellation.
//!
//! The worker registers a callback with the broker's receive loop and
//! settles every delivery according to the pipeline [`Outcome`]. The
//! subscription's token is a child of the client token: stopping the client
//! cancels every subscription, a handler panic cancels only its own.
//!
//! [`Outcome`]: crate::dispatch::Outcome

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ship_core::error::{ShipError, TransportError};
use ship_core::handler::{MessageHandler, RawMessageHandler};
use ship_core::transport::{Delivery, DeliveryCallback, Transport};

use crate::client::PubSub;
use crate::dispatch::{Dispatch, Disposition, EventPipeline, RawPipeline};

/// Lifecycle of a subscription worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// The subscription exists; the worker has not registered with the
    /// receive loop yet.
    Initializing,
    /// Registered with the broker's receive loop.
    Listening,
    /// Cancelled; waiting for in-flight handler calls to return.
    Draining,
    /// The worker has exited.
    Stopped,
}

/// Handle to a running subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    name: String,
    cancel: CancellationToken,
    state: watch::Receiver<WorkerState>,
}

impl SubscriptionHandle {
    /// Subscription name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current worker state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Returns `true` once the subscription has been cancelled, by client
    /// shutdown, by a handler panic or through [`SubscriptionHandle::cancel`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops delivery to this subscription only.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits until the worker has exited.
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        // A closed channel means the worker is gone.
        let _ = state
            .wait_for(|current| *current == WorkerState::Stopped)
            .await;
    }
}

impl PubSub {
    /// Subscribes `handler` to `subscription`. Messages are decoded from
    /// change-capture envelopes into registered event types.
    ///
    /// Returns once the worker is listening; delivery happens in the
    /// background until the client is stopped or the handler panics.
    ///
    /// # Errors
    ///
    /// Returns [`ShipError::SubscriptionMissing`] if the subscription does
    /// not exist, [`ShipError::Transport`] if the existence check fails and
    /// [`ShipError::Stopped`] after [`PubSub::stop`].
    pub async fn subscribe(
        &self,
        subscription: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionHandle, ShipError> {
        let pipeline = EventPipeline::new(subscription, Arc::clone(&self.registry), handler);
        self.start_worker(subscription, Arc::new(pipeline)).await
    }

    /// Subscribes a raw `handler` to `subscription`. Messages are passed
    /// through undecoded.
    ///
    /// # Errors
    ///
    /// Same as [`PubSub::subscribe`].
    pub async fn subscribe_raw(
        &self,
        subscription: &str,
        handler: Arc<dyn RawMessageHandler>,
    ) -> Result<SubscriptionHandle, ShipError> {
        let pipeline = RawPipeline::new(subscription, handler);
        self.start_worker(subscription, Arc::new(pipeline)).await
    }

    /// Checks that the subscription exists. Subscriptions are never created
    /// here.
    async fn sub_init(&self, subscription: &str) -> Result<(), ShipError> {
        info!(subscription, "checking if subscription exists");
        match self.transport.subscription_exists(subscription).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ShipError::SubscriptionMissing(subscription.to_owned())),
            Err(err) => {
                error!(subscription, error = %err, "could not check if subscription exists");
                Err(err.into())
            }
        }
    }

    async fn start_worker(
        &self,
        subscription: &str,
        pipeline: Arc<dyn Dispatch>,
    ) -> Result<SubscriptionHandle, ShipError> {
        self.ensure_running()?;
        self.sub_init(subscription).await?;

        info!(
            subscription,
            handler = pipeline.handler_name(),
            "starting listener for subscription"
        );

        let (state_tx, state_rx) = watch::channel(WorkerState::Initializing);
        let cancel = self.shutdown.child_token();
        let worker = Worker {
            subscription: subscription.to_owned(),
            transport: Arc::clone(&self.transport),
            pipeline,
            cancel: cancel.clone(),
            state: state_tx,
            errors: self.errors_tx.clone(),
        };
        self.workers.spawn(worker.run());

        Ok(SubscriptionHandle {
            name: subscription.to_owned(),
            cancel,
            state: state_rx,
        })
    }
}

struct Worker {
    subscription: String,
    transport: Arc<dyn Transport>,
    pipeline: Arc<dyn Dispatch>,
    cancel: CancellationToken,
    state: watch::Sender<WorkerState>,
    errors: mpsc::Sender<ShipError>,
}

impl Worker {
    fn callback(&self) -> DeliveryCallback {
        let subscription = self.subscription.clone();
        let pipeline = Arc::clone(&self.pipeline);
        let cancel = self.cancel.clone();

        Arc::new(move |delivery: Delivery| {
            let subscription = subscription.clone();
            let pipeline = Arc::clone(&pipeline);
            let cancel = cancel.clone();

            async move {
                let outcome = pipeline.process(delivery.message()).await;
                match outcome.disposition() {
                    Disposition::Ack => delivery.ack(),
                    Disposition::Nack => delivery.nack(),
                    Disposition::NackAndCancel => {
                        delivery.nack();
                        debug!(
                            subscription = %subscription,
                            handler = pipeline.handler_name(),
                            "cancelling panicked subscription context"
                        );
                        cancel.cancel();
                    }
                }
            }
            .boxed()
        })
    }

    async fn run(self) {
        debug!(
            subscription = %self.subscription,
            handler = self.pipeline.handler_name(),
            "subscription started"
        );

        let receive = self
            .transport
            .receive(&self.subscription, self.cancel.clone(), self.callback());
        tokio::pin!(receive);
        self.state.send_replace(WorkerState::Listening);

        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                self.drain();
                receive.await
            }
            result = &mut receive => {
                // A panicking handler cancels from inside the receive loop,
                // which can then return in the same poll.
                if self.cancel.is_cancelled() {
                    self.drain();
                }
                result
            }
        };

        if let Err(err) = result {
            self.report(err);
        }

        self.state.send_replace(WorkerState::Stopped);
        info!(subscription = %self.subscription, "subscription stopped");
    }

    fn drain(&self) {
        self.state.send_replace(WorkerState::Draining);
        debug!(subscription = %self.subscription, "draining subscription");
    }

    fn report(&self, err: TransportError) {
        error!(
            subscription = %self.subscription,
            error = %err,
            "unable to receive messages from subscription"
        );
        if let Err(mpsc::error::TrySendError::Full(err)) =
            self.errors.try_send(ShipError::Transport(err))
        {
            warn!(
                subscription = %self.subscription,
                error = %err,
                "receive error buffer is full, dropping error"
            );
        }
    }
}
