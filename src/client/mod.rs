//! The `client` module provides a client for talking to a running broker.
//!
//! It wraps the HTTP routes for listing topics and publishing, and the
//! websocket subscribe stream, including the optional dead-letter relay for
//! deliveries whose processing callback fails.

pub mod client;

pub use client::{CallbackError, QueueClient, SubscriptionHandle};
