use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::broker::queue::DeliveryQueue;
use crate::persistence::{MessageStore, StoreFactory, in_memory_factory};
use crate::utils::error::BrokerError;

/// A named, independent broker partition.
///
/// Owns exactly one message store and one delivery queue. Topics are only
/// ever constructed by the [`TopicRegistry`].
#[derive(Debug)]
pub struct Topic {
    pub name: String,
    store: Arc<dyn MessageStore>,
    queue: DeliveryQueue,
}

impl Topic {
    fn new(name: &str, store: Arc<dyn MessageStore>, backlog: usize) -> Self {
        Self {
            name: name.to_string(),
            store,
            queue: DeliveryQueue::new(backlog),
        }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    pub fn pending_deliveries(&self) -> usize {
        self.queue.pending()
    }

    pub fn subscribers(&self) -> usize {
        self.queue.subscribers()
    }
}

/// Concurrency-safe mapping from topic name to its resources.
///
/// The map has its own lock, separate from every store's lock, so topics
/// never serialize against each other once they exist. Entries are created
/// lazily and never removed.
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    make_store: StoreFactory,
    backlog: usize,
}

impl std::fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRegistry")
            .field("topics", &self.topics)
            .field("backlog", &self.backlog)
            .finish_non_exhaustive()
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new(in_memory_factory(), 0)
    }
}

impl TopicRegistry {
    pub fn new(make_store: StoreFactory, backlog: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            make_store,
            backlog,
        }
    }

    /// Returns the topic named `name`, creating it on first reference.
    ///
    /// Concurrent first references race on the write lock; exactly one store
    /// and queue pair is built and every caller gets the same instance.
    pub fn ensure_topic(&self, name: &str) -> Result<Arc<Topic>, BrokerError> {
        if let Some(topic) = self.get(name)? {
            return Ok(topic);
        }

        let mut topics = self
            .topics
            .write()
            .map_err(|_| BrokerError::RegistryPoisoned)?;
        let topic = topics.entry(name.to_string()).or_insert_with(|| {
            info!(topic = name, "created topic");
            Arc::new(Topic::new(name, (self.make_store)(), self.backlog))
        });
        Ok(topic.clone())
    }

    /// Looks up an existing topic without creating it.
    pub fn get(&self, name: &str) -> Result<Option<Arc<Topic>>, BrokerError> {
        let topics = self
            .topics
            .read()
            .map_err(|_| BrokerError::RegistryPoisoned)?;
        Ok(topics.get(name).cloned())
    }

    /// Names of every topic referenced so far, in no particular order.
    pub fn list_topics(&self) -> Result<Vec<String>, BrokerError> {
        let topics = self
            .topics
            .read()
            .map_err(|_| BrokerError::RegistryPoisoned)?;
        Ok(topics.keys().cloned().collect())
    }
}
