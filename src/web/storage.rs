//! localStorage-backed preference store

use crate::core::error::PersistenceError;
use crate::core::persistence::KeyValueStore;

/// `window.localStorage`. Absent or blocked storage (private mode, sandboxed
/// frames) reads as empty and rejects writes.
#[derive(Debug, Default)]
pub struct LocalStorageStore;

impl LocalStorageStore {
    fn storage() -> Option<web_sys::Storage> {
        web_sys::window().and_then(|w| w.local_storage().ok().flatten())
    }
}

impl KeyValueStore for LocalStorageStore {
    fn get(&self, key: &str) -> Option<String> {
        Self::storage().and_then(|s| s.get_item(key).ok().flatten())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let storage = Self::storage()
            .ok_or_else(|| PersistenceError::Unavailable("localStorage".to_string()))?;
        storage
            .set_item(key, value)
            .map_err(|e| PersistenceError::Unavailable(format!("{e:?}")))
    }
}
