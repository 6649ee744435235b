//! The `persistence` module provides the per-topic message store.
//!
//! A store is an append-only, offset-indexed container of message bodies.
//! Reads are destructive from the broker's point of view: once a body has been
//! handed to a subscriber its slot is tombstoned, but the offset stays
//! allocated and is never reused.
//!
//! The broker only talks to the [`MessageStore`] capability, so a durable
//! backend can be slotted in later without changing the broker's contract.
//! The default and only backend is [`InMemoryStore`].

pub mod memory_store;

use std::fmt::Debug;
use std::sync::Arc;

use crate::utils::error::StoreError;

pub use memory_store::InMemoryStore;

/// Zero-based position of a message within its topic's store.
pub type Offset = u64;

/// Put/get/delete capability over an offset-indexed body store.
pub trait MessageStore: Send + Sync + Debug {
    /// Appends `body` and returns the offset it was written at.
    fn put(&self, body: String) -> Result<Offset, StoreError>;

    /// Returns the body at `offset`, or `NotFound` if the offset was never
    /// written or has been deleted.
    fn get(&self, offset: Offset) -> Result<String, StoreError>;

    /// Tombstones the slot at `offset`. Deleting an already deleted slot is a
    /// no-op that still succeeds; an offset that was never allocated is
    /// `NotFound`.
    fn delete(&self, offset: Offset) -> Result<(), StoreError>;

    /// Number of offsets allocated so far, tombstones included.
    fn len(&self) -> Result<u64, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// Builds a fresh store for a newly registered topic.
pub type StoreFactory = Arc<dyn Fn() -> Arc<dyn MessageStore> + Send + Sync>;

/// Factory producing [`InMemoryStore`] instances.
pub fn in_memory_factory() -> StoreFactory {
    Arc::new(|| Arc::new(InMemoryStore::new()) as Arc<dyn MessageStore>)
}
