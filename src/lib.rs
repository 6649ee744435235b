//! # topicq
//!
//! `topicq` is a minimal, in-memory message broker built with Rust.
//! Producers publish string payloads to named topics over HTTP; consumers
//! attach over a websocket and receive payloads one at a time.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `broker`: The central component: topic registry, delivery queues, and the publish and
//!   subscribe paths.
//! - `client`: An HTTP/websocket client with an optional dead-letter relay.
//! - `config`: Handles loading and managing configuration.
//! - `persistence`: The per-topic message store (in-memory).
//! - `transport`: The HTTP routes, websocket subscribe endpoint and server bootstrap.
//! - `utils`: Shared utilities, such as error types and logging.
//!
//! Delivery is at-most-once and competing: each message goes to exactly one
//! attached subscriber, and is removed from the store as it is handed out.

pub mod broker;
pub mod client;
pub mod config;
pub mod persistence;
pub mod transport;
pub mod utils;
