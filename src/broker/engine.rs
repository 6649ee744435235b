//! Broker engine
//!
//! This module ties the topic registry to the two request paths:
//! - the publish path stores a body, assigns its offset and queues one
//!   delivery notification without waiting for a consumer
//! - the subscribe path runs one loop per connection that takes a
//!   notification, reads and deletes the body, then pushes it out
//!
//! Delivery is at-most-once. The body is deleted before the push, so a push
//! that fails on a broken connection loses the message.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::message::{Delivery, Message, Notification, PublishReceipt, message_id};
use crate::broker::sink::DeliverySink;
use crate::broker::topic::{Topic, TopicRegistry};
use crate::config::BrokerSettings;
use crate::persistence::{Offset, StoreFactory, in_memory_factory};
use crate::utils::error::{BrokerError, StoreError};

/// Why a subscriber loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEnd {
    /// The connection went away and cancelled the loop.
    Cancelled,
    /// The delivery queue closed.
    QueueClosed,
}

#[derive(Debug, Default)]
pub struct Broker {
    registry: TopicRegistry,
}

impl Broker {
    pub fn new(settings: &BrokerSettings) -> Self {
        Self::with_store_factory(settings, in_memory_factory())
    }

    pub fn with_store_factory(settings: &BrokerSettings, make_store: StoreFactory) -> Self {
        Self {
            registry: TopicRegistry::new(make_store, settings.delivery_backlog),
        }
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    pub fn list_topics(&self) -> Result<Vec<String>, BrokerError> {
        self.registry.list_topics()
    }

    /// Looks up a topic without creating it.
    pub fn topic(&self, name: &str) -> Result<Option<Arc<Topic>>, BrokerError> {
        self.registry.get(name)
    }

    /// Reads the stored message at `offset` without consuming it.
    ///
    /// A delivered message is tombstoned, so reading it back fails with
    /// `NotFound`, as does any offset on a topic that does not exist yet.
    pub fn read(&self, topic: &str, offset: Offset) -> Result<Message, BrokerError> {
        let entry = self
            .registry
            .get(topic)?
            .ok_or(StoreError::NotFound(offset))?;
        let body = entry.store().get(offset)?;
        Ok(Message {
            id: message_id(topic, offset),
            offset,
            body,
        })
    }

    /// Stores `body` on `topic` and queues its delivery.
    ///
    /// Returns as soon as the body is stored, whether or not a subscriber is
    /// attached. With a backlog limit configured, fails with `Backlogged`
    /// before touching the store when the topic already holds that many
    /// undelivered notifications.
    pub fn publish(&self, topic: &str, body: String) -> Result<PublishReceipt, BrokerError> {
        validate_topic(topic)?;
        let entry = self.registry.ensure_topic(topic)?;

        let queue = entry.queue();
        let slot = queue.reserve().ok_or_else(|| BrokerError::Backlogged {
            topic: topic.to_string(),
            capacity: queue.limit().unwrap_or_default(),
        })?;

        let offset = entry.store().put(body)?;
        let notification = Notification::new(topic, offset);
        let receipt = PublishReceipt {
            offset,
            message_id: notification.id.clone(),
        };
        slot.send(notification);

        debug!(topic, offset, message_id = %receipt.message_id, "published message");
        Ok(receipt)
    }

    /// Runs one subscriber loop on `topic` until `cancel` fires or a push fails.
    ///
    /// Each iteration waits for a notification, fetches the body, tombstones
    /// it and pushes it to `sink`. A body that can no longer be read is
    /// logged and skipped.
    pub async fn subscribe<S: DeliverySink>(
        &self,
        topic: &str,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<SubscriptionEnd, BrokerError> {
        validate_topic(topic)?;
        let entry = self.registry.ensure_topic(topic)?;
        let _attached = entry.queue().attach();
        info!(topic, subscribers = entry.subscribers(), "subscriber attached");

        loop {
            let notification = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(SubscriptionEnd::Cancelled),
                next = entry.queue().take() => next,
            };
            let Some(notification) = notification else {
                return Ok(SubscriptionEnd::QueueClosed);
            };

            let value = match entry.store().get(notification.offset) {
                Ok(value) => value,
                Err(err) => {
                    warn!(
                        topic,
                        message_id = %notification.id,
                        error = %err,
                        "could not read message from storage"
                    );
                    continue;
                }
            };

            if let Err(err) = entry.store().delete(notification.offset) {
                warn!(
                    topic,
                    message_id = %notification.id,
                    error = %err,
                    "could not delete message from storage"
                );
                continue;
            }

            let delivery = Delivery {
                topic: topic.to_string(),
                message_id: notification.id,
                value,
            };

            if let Err(err) = sink.deliver(&delivery).await {
                warn!(
                    topic,
                    message_id = %delivery.message_id,
                    error = %err,
                    "delivery lost, could not write to subscriber"
                );
                return Err(err.into());
            }
            debug!(topic, message_id = %delivery.message_id, "delivered message");
        }
    }
}

fn validate_topic(topic: &str) -> Result<(), BrokerError> {
    if topic.is_empty() {
        return Err(BrokerError::InvalidTopic(topic.to_string()));
    }
    Ok(())
}
