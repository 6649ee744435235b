use serde::{Deserialize, Serialize};

use crate::persistence::Offset;

/// Suffix appended to a topic name to form its dead-letter topic.
pub const DEAD_LETTER_SUFFIX: &str = ".deadletter";

/// Builds the message identifier for `offset` on `topic`.
///
/// Identifiers are deterministic, so the same topic/offset pair always maps
/// to the same id: `"<topic>-<offset>"`.
pub fn message_id(topic: &str, offset: Offset) -> String {
    format!("{topic}-{offset}")
}

/// Name of the topic that parks failed deliveries of `topic`.
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{topic}{DEAD_LETTER_SUFFIX}")
}

/// A message as held by the broker.
///
/// The body lives in the topic's store; only the id/offset pair travels
/// through the delivery queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub offset: Offset,
    pub body: String,
}

/// Ephemeral handoff from the publish path to exactly one subscriber loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub offset: Offset,
}

impl Notification {
    pub fn new(topic: &str, offset: Offset) -> Self {
        Self {
            id: message_id(topic, offset),
            offset,
        }
    }
}

/// What the publisher gets back once the body is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub offset: Offset,
    pub message_id: String,
}

/// One frame pushed to a subscriber.
///
/// Serialized as `{"topic": .., "messageId": .., "value": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub topic: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub value: String,
}
