//! Handler abstractions for consumed messages.

use std::future::Future;

use async_trait::async_trait;

use crate::message::{Message, RawMessage};

/// Error returned by application handler code. Any handler error requests
/// redelivery of the message.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Handles messages reconstructed from delivered envelopes.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one message.
    ///
    /// # Errors
    ///
    /// Returning an error negative-acknowledges the delivery.
    async fn handle_message(&self, message: Message) -> Result<(), HandlerError>;

    /// Name used in log fields.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Handles raw broker messages without envelope decoding.
#[async_trait]
pub trait RawMessageHandler: Send + Sync {
    /// Handles one raw message.
    ///
    /// # Errors
    ///
    /// Returning an error negative-acknowledges the delivery.
    async fn handle_raw_message(&self, message: &RawMessage) -> Result<(), HandlerError>;

    /// Name used in log fields.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Adapter turning an async closure into a [`MessageHandler`].
#[derive(Debug, Clone, Copy)]
pub struct HandlerFn<F> {
    name: &'static str,
    f: F,
}

/// Wraps `f` as a [`MessageHandler`] named `name`.
///
/// ```
/// use ship_core::handler::{handler_fn, HandlerError, MessageHandler};
/// use ship_core::message::Message;
///
/// let handler = handler_fn("audit", |message: Message| async move {
///     println!("{}", message.event_type);
///     Ok::<(), HandlerError>(())
/// });
/// assert_eq!(handler.name(), "audit");
/// ```
pub fn handler_fn<F, Fut>(name: &'static str, f: F) -> HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    HandlerFn { name, f }
}

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle_message(&self, message: Message) -> Result<(), HandlerError> {
        (self.f)(message).await
    }

    fn name(&self) -> &str {
        self.name
    }
}
