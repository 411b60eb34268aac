use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::store::{DurableStore, StorageKey};

/// Process-local store, used for ephemeral sessions and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<StorageKey, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<StorageKey, String>> {
        // A poisoned map still holds the last complete write
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl DurableStore for MemoryStore {
    fn load(&self, key: StorageKey) -> Result<Option<String>> {
        Ok(self.entries().get(&key).cloned())
    }

    fn save(&self, key: StorageKey, value: &str) -> Result<()> {
        self.entries().insert(key, value.to_string());
        Ok(())
    }
}
