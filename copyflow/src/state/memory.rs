//! In-memory state store.

use parking_lot::RwLock;
use std::collections::HashMap;

use super::StateStore;
use crate::errors::StateStoreError;

/// A thread-safe, non-durable store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStateStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from existing data.
    #[must_use]
    pub fn from_data(data: HashMap<String, String>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set_many(&self, entries: &[(String, String)]) -> Result<(), StateStoreError> {
        let mut data = self.data.write();
        for (key, value) in entries {
            data.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[String]) -> Result<(), StateStoreError> {
        let mut data = self.data.write();
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }

    fn entries(&self) -> Result<HashMap<String, String>, StateStoreError> {
        Ok(self.data.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = MemoryStateStore::new();
        assert!(store.is_empty());

        store.set("outline.brand", "创维").unwrap();
        assert_eq!(store.get("outline.brand").unwrap().as_deref(), Some("创维"));

        store.remove("outline.brand").unwrap();
        assert_eq!(store.get("outline.brand").unwrap(), None);
    }

    #[test]
    fn test_remove_many_ignores_missing() {
        let store = MemoryStateStore::new();
        store.set("a", "1").unwrap();
        store
            .remove_many(&["a".to_string(), "missing".to_string()])
            .unwrap();
        assert!(store.is_empty());
    }
}
