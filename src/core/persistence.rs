//! UI preference persistence
//!
//! Only presentation preferences are stored. Alliance data is always
//! re-derived from the live page.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::PersistenceError;

pub const PREFS_KEY: &str = "adp.prefs";

/// String key-value storage (localStorage in the browser)
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OverlayPrefs {
    #[serde(default)]
    pub collapsed: bool,
}

impl OverlayPrefs {
    /// Stored preferences, or defaults if absent or unreadable
    pub fn load<K: KeyValueStore + ?Sized>(store: &K) -> Self {
        let Some(raw) = store.get(PREFS_KEY) else {
            return Self::default();
        };
        match serde_json::from_str(&raw) {
            Ok(prefs) => {
                debug!(?prefs, "[PREFS] Loaded");
                prefs
            }
            Err(e) => {
                warn!(error = %e, "[PREFS] Ignoring unreadable preferences");
                Self::default()
            }
        }
    }

    pub fn save<K: KeyValueStore + ?Sized>(&self, store: &K) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(self)?;
        store.set(PREFS_KEY, &raw)
    }
}
