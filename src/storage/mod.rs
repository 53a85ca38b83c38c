//! Persistent key-value storage for session state.
//!
//! The [`StorageAdapter`] wraps any [`KeyValueStore`] with JSON (de)serialization
//! and swallows every backend failure: a read that fails looks like a missing
//! key, a write that fails is logged. Callers above this layer never see
//! storage errors.
//!
//! Two backends are provided:
//! - [`MemoryStore`]: shared in-process map with per-context handles and change
//!   notifications, the model for several tabs sharing one origin
//! - [`FileStore`]: a JSON file on disk, used by the headless CLI

pub mod file;
pub mod memory;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

pub use file::{default_storage_path, FileStore};
pub use memory::MemoryStore;

/// Storage keys owned by the session controller.
pub mod keys {
    pub const SESSION: &str = "swapquest_session";
    pub const USER: &str = "swapquest_user";
    pub const CONNECTED: &str = "swapquest_connected";

    /// Clearing order: the connected flag goes first so readers never see a
    /// connected flag pointing at a half-removed session.
    pub const ALL: [&str; 3] = [CONNECTED, SESSION, USER];
}

/// Identifies one execution context (tab, process) sharing a store.
pub type ContextId = uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Stored value is corrupt: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Change notification emitted when another context writes a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
    pub key: String,
    /// Raw JSON after the write, `None` when the key was removed
    pub new_value: Option<String>,
    pub origin: ContextId,
}

/// Raw string key-value store scoped to one origin.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Subscribe to writes made by any context. Backends without change
    /// notifications return `None`.
    fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>>;

    /// The context this handle writes as.
    fn context_id(&self) -> ContextId;
}

/// JSON storage wrapper with failure containment.
#[derive(Clone)]
pub struct StorageAdapter {
    store: Arc<dyn KeyValueStore>,
}

impl StorageAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load and decode a value. Missing keys, backend failures and undecodable
    /// JSON all yield `None`.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("[storage] Failed to load {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("[storage] Discarding undecodable value for {}: {}", key, e);
                None
            }
        }
    }

    /// Encode and store a value. Returns whether the write landed.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("[storage] Failed to encode {}: {}", key, e);
                return false;
            }
        };

        match self.store.set(key, &raw) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("[storage] Failed to save {}: {}", key, e);
                false
            }
        }
    }

    /// Remove a key. Returns whether the removal landed.
    pub fn remove(&self, key: &str) -> bool {
        match self.store.remove(key) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("[storage] Failed to remove {}: {}", key, e);
                false
            }
        }
    }

    /// Remove every key owned by the session controller.
    pub fn clear_session_keys(&self) -> bool {
        keys::ALL
            .iter()
            .fold(true, |ok, key| self.remove(key) && ok)
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        self.store.subscribe()
    }

    pub fn context_id(&self) -> ContextId {
        self.store.context_id()
    }
}

impl std::fmt::Debug for StorageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdapter")
            .field("context_id", &self.store.context_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store whose every operation can be switched to fail.
    pub struct FlakyStore {
        inner: MemoryStore,
        pub failing: AtomicBool,
    }

    impl FlakyStore {
        pub fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                failing: AtomicBool::new(false),
            }
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), StorageError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(StorageError::Unavailable("quota exceeded".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.check()?;
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.check()?;
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.check()?;
            self.inner.remove(key)
        }

        fn subscribe(&self) -> Option<broadcast::Receiver<StorageEvent>> {
            None
        }

        fn context_id(&self) -> ContextId {
            self.inner.context_id()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FlakyStore;
    use super::*;

    #[test]
    fn test_adapter_round_trip() {
        let adapter = StorageAdapter::new(Arc::new(MemoryStore::new()));
        assert!(adapter.save(keys::CONNECTED, &true));
        assert_eq!(adapter.load::<bool>(keys::CONNECTED), Some(true));
    }

    #[test]
    fn test_adapter_missing_key_is_none() {
        let adapter = StorageAdapter::new(Arc::new(MemoryStore::new()));
        assert_eq!(adapter.load::<bool>(keys::CONNECTED), None);
    }

    #[test]
    fn test_adapter_corrupt_value_is_none() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::USER, "{not json").unwrap();
        let adapter = StorageAdapter::new(store);
        assert_eq!(adapter.load::<serde_json::Value>(keys::USER), None);
    }

    #[test]
    fn test_adapter_absorbs_backend_failures() {
        let store = Arc::new(FlakyStore::new());
        let adapter = StorageAdapter::new(store.clone());
        assert!(adapter.save(keys::CONNECTED, &true));

        store.set_failing(true);
        assert_eq!(adapter.load::<bool>(keys::CONNECTED), None);
        assert!(!adapter.save(keys::CONNECTED, &false));
        assert!(!adapter.clear_session_keys());

        store.set_failing(false);
        assert_eq!(adapter.load::<bool>(keys::CONNECTED), Some(true));
    }

    #[test]
    fn test_clear_session_keys_removes_all() {
        let adapter = StorageAdapter::new(Arc::new(MemoryStore::new()));
        for key in keys::ALL {
            adapter.save(key, &"value");
        }
        assert!(adapter.clear_session_keys());
        for key in keys::ALL {
            assert_eq!(adapter.load::<String>(key), None);
        }
    }
}
