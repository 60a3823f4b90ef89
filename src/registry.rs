//! Process-wide table of initialized stores.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::{BiometricStorageError, Result};

/// Maps store names to their live state.
///
/// Entries are shared: callers clone the `Arc` out and release the table
/// lock before doing any slow work on the entry.
pub struct StorageRegistry<T> {
    entries: Mutex<HashMap<String, Arc<T>>>,
}

impl<T> StorageRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up an initialized store.
    pub fn get(&self, name: &str) -> Result<Arc<T>> {
        self.entries
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| BiometricStorageError::NotInitialized(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    /// Register `name` unless it already exists.
    ///
    /// `create` only runs when the name is free, under the table lock, so
    /// two concurrent inits of the same name create a single entry.
    /// Returns `true` if the entry was created.
    pub fn insert_with<F>(&self, name: &str, create: F) -> Result<bool>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut entries = self.entries.lock();
        if entries.contains_key(name) {
            return Ok(false);
        }
        entries.insert(name.to_string(), Arc::new(create()?));
        Ok(true)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<T>> {
        self.entries.lock().remove(name)
    }
}

impl<T> Default for StorageRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_store_is_not_initialized() {
        let registry: StorageRegistry<u32> = StorageRegistry::new();
        let result = registry.get("notes");
        assert!(matches!(result, Err(BiometricStorageError::NotInitialized(n)) if n == "notes"));
    }

    #[test]
    fn insert_with_only_creates_once() {
        let registry = StorageRegistry::new();
        assert!(registry.insert_with("notes", || Ok(1)).unwrap());
        assert!(!registry
            .insert_with("notes", || -> Result<i32> { panic!("must not run") })
            .unwrap());
        assert_eq!(*registry.get("notes").unwrap(), 1);
    }

    #[test]
    fn failed_create_leaves_no_entry() {
        let registry: StorageRegistry<u32> = StorageRegistry::new();
        let result =
            registry.insert_with("notes", || Err(BiometricStorageError::BadArguments("no".into())));
        assert!(result.is_err());
        assert!(!registry.contains("notes"));
    }

    #[test]
    fn remove_only_drops_the_named_entry() {
        let registry = StorageRegistry::new();
        registry.insert_with("b", || Ok(())).unwrap();
        registry.insert_with("a", || Ok(())).unwrap();

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(!registry.contains("a"));
        assert!(registry.contains("b"));
    }
}
