//! In-process shared store with cross-context change notifications.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{ContextId, KeyValueStore, StorageError, StorageEvent};

/// Capacity of the change notification channel. Lagging listeners lose the
/// oldest events; the reconciliation tick repairs what they miss.
const EVENT_CAPACITY: usize = 64;

struct Shared {
    entries: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

/// Handle onto a shared map. Every handle created through [`MemoryStore::context`]
/// sees the same entries but writes under its own [`ContextId`].
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    context_id: ContextId,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                entries: RwLock::new(HashMap::new()),
                events,
            }),
            context_id: Uuid::new_v4(),
        }
    }

    /// A new context sharing this store's entries.
    pub fn context(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            context_id: Uuid::new_v4(),
        }
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        // No receivers is fine
        let _ = self.shared.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
            origin: self.context_id,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.shared.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.shared
            .entries
            .write()
            .insert(key.to_string(), value.to_string());
        self.notify(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let removed = self.shared.entries.write().remove(key);
        if removed.is_some() {
            self.notify(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        Some(self.shared.events.subscribe())
    }

    fn context_id(&self) -> ContextId {
        self.context_id
    }
}
