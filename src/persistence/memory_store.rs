use std::sync::RwLock;

use tracing::trace;

use super::{MessageStore, Offset};
use crate::utils::error::StoreError;

/// In-process [`MessageStore`] backed by a growable vector of slots.
///
/// `None` marks a tombstoned slot, so an empty body and a deleted one stay
/// distinguishable. `get` is the only operation that takes the shared lock.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    slots: RwLock<Vec<Option<String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn index(offset: Offset) -> Option<usize> {
    usize::try_from(offset).ok()
}

impl MessageStore for InMemoryStore {
    fn put(&self, body: String) -> Result<Offset, StoreError> {
        let mut slots = self.slots.write().map_err(|_| StoreError::Poisoned)?;
        slots.push(Some(body));
        let offset = (slots.len() - 1) as Offset;
        trace!(offset, "stored message body");
        Ok(offset)
    }

    fn get(&self, offset: Offset) -> Result<String, StoreError> {
        let slots = self.slots.read().map_err(|_| StoreError::Poisoned)?;
        index(offset)
            .and_then(|i| slots.get(i))
            .and_then(|slot| slot.clone())
            .ok_or(StoreError::NotFound(offset))
    }

    fn delete(&self, offset: Offset) -> Result<(), StoreError> {
        let mut slots = self.slots.write().map_err(|_| StoreError::Poisoned)?;
        let slot = index(offset)
            .and_then(|i| slots.get_mut(i))
            .ok_or(StoreError::NotFound(offset))?;
        if slot.take().is_some() {
            trace!(offset, "tombstoned message body");
        }
        Ok(())
    }

    fn len(&self) -> Result<u64, StoreError> {
        let slots = self.slots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(slots.len() as u64)
    }
}
