//! Ship Pub/Sub — typed event delivery over a publish/subscribe broker.
//!
//! Producers publish [`Message`](ship_core::message::Message)s; consumers
//! subscribe handlers that receive messages rebuilt from change-data-capture
//! envelopes, with the payload decoded into the event type registered under
//! the envelope's `type`.
//!
//! Delivery is at-least-once: data that can never be processed is
//! acknowledged and dropped, handler errors are negative-acknowledged for
//! redelivery, and a panicking handler stops only its own subscription.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod memory;
mod publisher;
pub mod subscriber;

pub use client::PubSub;
pub use config::{ClientConfig, ConfigError};
pub use subscriber::{SubscriptionHandle, WorkerState};
