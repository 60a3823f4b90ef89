//! Key storage backing the Key Manager.
//!
//! A `KeyStore` is the seam to the platform's secure key container
//! (Android Keystore, Apple Secure Enclave, ...).  This crate ships two
//! implementations:
//! - `FileKeyStore`: owner-only key records on disk (`file`)
//! - `MemoryKeyStore`: keys that live as long as the process (`memory`)

pub mod file;
pub mod memory;

use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::errors::Result;
use crate::policy::StorePolicy;

pub use file::FileKeyStore;
pub use memory::MemoryKeyStore;

/// Length of a store key in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// A symmetric key together with the policy it was generated under.
#[derive(Clone)]
pub struct StoredKey {
    pub alias: String,
    pub spec: StorePolicy,
    /// Biometric enrollment identifier current when the key was generated.
    pub enrollment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub(crate) material: Zeroizing<[u8; KEY_LEN]>,
}

impl StoredKey {
    pub(crate) fn new(
        alias: &str,
        spec: StorePolicy,
        enrollment: Option<&str>,
        material: [u8; KEY_LEN],
    ) -> Self {
        Self {
            alias: alias.to_string(),
            spec,
            enrollment: enrollment.map(str::to_string),
            created_at: Utc::now(),
            material: Zeroizing::new(material),
        }
    }
}

impl std::fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredKey")
            .field("alias", &self.alias)
            .field("spec", &self.spec)
            .field("enrollment", &self.enrollment)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Platform container for store keys.
pub trait KeyStore: Send + Sync {
    /// Load the key stored under `alias`, if any.
    fn load_key(&self, alias: &str) -> Result<Option<StoredKey>>;

    /// Generate and persist a fresh random key under `alias`.
    ///
    /// Overwrites nothing: callers check `load_key` first.
    fn generate_key(
        &self,
        alias: &str,
        spec: &StorePolicy,
        enrollment: Option<&str>,
    ) -> Result<StoredKey>;

    /// Remove the key.  Returns `false` if there was nothing to remove.
    fn delete_key(&self, alias: &str) -> Result<bool>;

    fn contains_key(&self, alias: &str) -> Result<bool> {
        Ok(self.load_key(alias)?.is_some())
    }
}

/// Generate fresh random key material.
pub(crate) fn generate_material() -> [u8; KEY_LEN] {
    use aes_gcm::aead::{KeyInit, OsRng};
    use aes_gcm::Aes256Gcm;

    let generated = Aes256Gcm::generate_key(&mut OsRng);
    let mut material = [0u8; KEY_LEN];
    material.copy_from_slice(generated.as_slice());
    material
}
