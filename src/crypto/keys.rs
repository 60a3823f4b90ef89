//! Key Manager: one key per store, named deterministically from the
//! store name.
//!
//! A key's policy is fixed when it is generated.  `get_or_create_key`
//! never reconfigures an existing key; a policy change has to go through
//! `delete_key` first.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{BiometricStorageError, Result};
use crate::keystore::{KeyStore, StoredKey};
use crate::policy::StorePolicy;

/// Creates, loads and deletes store keys in a `KeyStore`.
#[derive(Clone)]
pub struct KeyManager {
    keystore: Arc<dyn KeyStore>,
    namespace: String,
}

impl KeyManager {
    pub fn new(keystore: Arc<dyn KeyStore>, namespace: impl Into<String>) -> Self {
        Self {
            keystore,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Alias of the key backing store `name`: `<namespace>.<name>`.
    pub fn key_alias(&self, name: &str) -> String {
        format!("{}.{name}", self.namespace)
    }

    /// Return the store's key, generating one under `policy` if none exists.
    ///
    /// `enrollment` is recorded on new keys so a later enrollment change
    /// can be detected.
    pub fn get_or_create_key(
        &self,
        name: &str,
        policy: &StorePolicy,
        enrollment: Option<&str>,
    ) -> Result<StoredKey> {
        policy
            .validate()
            .map_err(|e| BiometricStorageError::KeyStore(e.to_string()))?;

        let alias = self.key_alias(name);
        if let Some(existing) = self.keystore.load_key(&alias)? {
            check_key_policy(&existing, policy)?;
            return Ok(existing);
        }

        let key = self.keystore.generate_key(&alias, policy, enrollment)?;
        info!(
            alias = %alias,
            authentication_required = policy.authentication_required,
            biometric_only = policy.biometric_only,
            validity_secs = ?policy.validity_secs,
            "generated store key"
        );
        Ok(key)
    }

    /// Load the store's key without creating one.
    pub fn existing_key(&self, name: &str) -> Result<Option<StoredKey>> {
        self.keystore.load_key(&self.key_alias(name))
    }

    /// Fail if the store already has a key generated under another policy.
    ///
    /// Keys are never reconfigured, and a key whose policy disagrees with
    /// the store's would reject every authorization the store obtains.
    pub fn ensure_policy(&self, name: &str, policy: &StorePolicy) -> Result<()> {
        match self.existing_key(name)? {
            Some(existing) => check_key_policy(&existing, policy),
            None => Ok(()),
        }
    }

    /// Remove the store's key.  Never fails; errors are logged.
    pub fn delete_key(&self, name: &str) -> bool {
        let alias = self.key_alias(name);
        match self.keystore.delete_key(&alias) {
            Ok(deleted) => {
                debug!(alias = %alias, deleted, "deleted store key");
                deleted
            }
            Err(e) => {
                warn!(alias = %alias, error = %e, "failed to delete store key");
                false
            }
        }
    }
}

fn check_key_policy(key: &StoredKey, policy: &StorePolicy) -> Result<()> {
    if policy.matches_key(&key.spec) {
        return Ok(());
    }
    warn!(alias = %key.alias, "store policy differs from its existing key");
    Err(BiometricStorageError::KeyStore(format!(
        "key '{}' was generated with authenticationRequired={}, biometricOnly={}, validity={:?}s; \
         delete the store before changing its policy",
        key.alias,
        key.spec.authentication_required,
        key.spec.biometric_only,
        key.spec.validity_secs,
    )))
}
