//! Ship Core — event, message and transport abstractions.
//!
//! This crate defines the event capability and its registry, the message
//! model, handler traits and the contract of the external broker client. It
//! contains no I/O.

pub mod clock;
pub mod error;
pub mod event;
pub mod handler;
pub mod message;
pub mod registry;
pub mod transport;
