//! File-backed key store.
//!
//! Each key is a small JSON record written with owner-only permissions:
//!
//! ```text
//! <keys_dir>/<alias>.key   {"version":1,"spec":{..},"enrollment":..,"created_at":..,"material":"<base64>"}
//! ```
//!
//! This stands in for a hardware keystore on hosts that have none.  The
//! key material is as safe as the directory holding it.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use super::{generate_material, KeyStore, StoredKey, KEY_LEN};
use crate::errors::{BiometricStorageError, Result};
use crate::policy::StorePolicy;
use crate::storage::write_owner_only;

const RECORD_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct KeyRecord {
    version: u32,
    spec: StorePolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enrollment: Option<String>,
    created_at: DateTime<Utc>,
    material: String,
}

impl Drop for KeyRecord {
    fn drop(&mut self) {
        self.material.zeroize();
    }
}

/// Key store keeping one record file per alias.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, alias: &str) -> PathBuf {
        self.dir.join(format!("{alias}.key"))
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|e| {
                BiometricStorageError::KeyStore(format!("cannot create key directory: {e}"))
            })?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = fs::Permissions::from_mode(0o700);
                fs::set_permissions(&self.dir, perms).map_err(|e| {
                    BiometricStorageError::KeyStore(format!(
                        "failed to set key directory permissions: {e}"
                    ))
                })?;
            }
        }
        Ok(())
    }
}

impl KeyStore for FileKeyStore {
    fn load_key(&self, alias: &str) -> Result<Option<StoredKey>> {
        let path = self.record_path(alias);
        if !path.exists() {
            return Ok(None);
        }

        let data = Zeroizing::new(
            fs::read(&path)
                .map_err(|e| BiometricStorageError::KeyStore(format!("failed to read key: {e}")))?,
        );
        let record: KeyRecord = serde_json::from_slice(&data)
            .map_err(|e| BiometricStorageError::KeyStore(format!("malformed key record: {e}")))?;

        if record.version != RECORD_VERSION {
            return Err(BiometricStorageError::KeyStore(format!(
                "unsupported key record version {}, expected {RECORD_VERSION}",
                record.version
            )));
        }

        let decoded = Zeroizing::new(
            BASE64
                .decode(&record.material)
                .map_err(|e| BiometricStorageError::KeyStore(format!("malformed key: {e}")))?,
        );
        if decoded.len() != KEY_LEN {
            return Err(BiometricStorageError::KeyStore(format!(
                "key must be exactly {KEY_LEN} bytes, got {}",
                decoded.len()
            )));
        }
        let mut material = [0u8; KEY_LEN];
        material.copy_from_slice(&decoded);

        Ok(Some(StoredKey {
            alias: alias.to_string(),
            spec: record.spec,
            enrollment: record.enrollment.clone(),
            created_at: record.created_at,
            material: Zeroizing::new(material),
        }))
    }

    fn generate_key(
        &self,
        alias: &str,
        spec: &StorePolicy,
        enrollment: Option<&str>,
    ) -> Result<StoredKey> {
        self.ensure_dir()?;

        let key = StoredKey::new(alias, *spec, enrollment, generate_material());
        let record = KeyRecord {
            version: RECORD_VERSION,
            spec: key.spec,
            enrollment: key.enrollment.clone(),
            created_at: key.created_at,
            material: BASE64.encode(key.material.as_slice()),
        };
        let bytes = Zeroizing::new(serde_json::to_vec(&record).map_err(|e| {
            BiometricStorageError::KeyStore(format!("failed to encode key record: {e}"))
        })?);

        // Owner-only from creation, then renamed into place.
        let path = self.record_path(alias);
        let tmp_path = self.dir.join(format!(".{alias}.key.tmp"));
        let written = write_owner_only(&tmp_path, bytes.as_slice())
            .and_then(|()| fs::rename(&tmp_path, &path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(BiometricStorageError::KeyStore(format!(
                "failed to store key: {e}"
            )));
        }

        Ok(key)
    }

    fn delete_key(&self, alias: &str) -> Result<bool> {
        let path = self.record_path(alias);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BiometricStorageError::KeyStore(format!(
                "failed to delete key: {e}"
            ))),
        }
    }
}
