//! The `error` module defines the error types used within the `topicq` application.
//!
//! Errors stay local to the request or connection that triggered them: a store
//! miss ends one delivery, a transport failure ends one subscriber loop, and a
//! client input error never mutates server state.

use thiserror::Error;

use crate::persistence::Offset;

/// Failures reported by a [`MessageStore`](crate::persistence::MessageStore).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The offset was never written or its slot has been tombstoned.
    #[error("offset {0} not found")]
    NotFound(Offset),

    #[error("message store lock poisoned")]
    Poisoned,
}

/// Failures raised while pushing a delivery to a connected subscriber.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("subscriber connection closed")]
    Closed,

    #[error("could not encode delivery: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors surfaced by the broker engine.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("invalid topic name {0:?}")]
    InvalidTopic(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The topic already holds `capacity` undelivered notifications.
    #[error("delivery backlog for topic {topic:?} is full ({capacity} pending)")]
    Backlogged { topic: String, capacity: usize },

    #[error("topic registry lock poisoned")]
    RegistryPoisoned,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl BrokerError {
    /// Whether the error was caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, BrokerError::InvalidTopic(_))
    }
}

/// Errors returned by [`QueueClient`](crate::client::QueueClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket failure: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid server address: {0}")]
    Url(#[from] url::ParseError),

    #[error("server responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode server response: {0}")]
    Decode(#[from] serde_json::Error),
}
