//! In-process key store.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{generate_material, KeyStore, StoredKey};
use crate::errors::{BiometricStorageError, Result};
use crate::policy::StorePolicy;

/// Keys held in memory for the lifetime of the store.
///
/// Can be switched to "unavailable" to mimic a keystore daemon that is
/// not reachable.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, StoredKey>>,
    unavailable: Mutex<bool>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        *self.unavailable.lock() = !available;
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if *self.unavailable.lock() {
            return Err(BiometricStorageError::KeyStore(
                "key store is not available".into(),
            ));
        }
        Ok(())
    }
}

impl KeyStore for MemoryKeyStore {
    fn load_key(&self, alias: &str) -> Result<Option<StoredKey>> {
        self.check_available()?;
        Ok(self.keys.lock().get(alias).cloned())
    }

    fn generate_key(
        &self,
        alias: &str,
        spec: &StorePolicy,
        enrollment: Option<&str>,
    ) -> Result<StoredKey> {
        self.check_available()?;
        let key = StoredKey::new(alias, *spec, enrollment, generate_material());
        self.keys.lock().insert(alias.to_string(), key.clone());
        Ok(key)
    }

    fn delete_key(&self, alias: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.keys.lock().remove(alias).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_store_fails_every_call() {
        let store = MemoryKeyStore::new();
        store.set_available(false);

        assert!(store.load_key("a").is_err());
        assert!(store
            .generate_key("a", &StorePolicy::unauthenticated(), None)
            .is_err());
        assert!(store.delete_key("a").is_err());

        store.set_available(true);
        assert!(store.load_key("a").unwrap().is_none());
    }

    #[test]
    fn generate_then_delete() {
        let store = MemoryKeyStore::new();
        store
            .generate_key("a", &StorePolicy::unauthenticated(), None)
            .unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.delete_key("a").unwrap());
        assert!(store.is_empty());
    }
}
