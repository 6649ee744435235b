//! Wire models for the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::broker::PublishReceipt;
use crate::persistence::Offset;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub offset: Offset,
    #[serde(rename = "messageId")]
    pub message_id: String,
}

impl From<PublishReceipt> for PublishResponse {
    fn from(receipt: PublishReceipt) -> Self {
        Self {
            offset: receipt.offset,
            message_id: receipt.message_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicsResponse {
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
