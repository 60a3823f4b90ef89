//! Storage File: one named store's files on disk.
//!
//! Layout inside the storage directory:
//!
//! ```text
//! <name>.v2.bin        current format: nonce(12) ‖ ciphertext ‖ tag(16)
//! <name>.txt           legacy JSON document, migrated on first read
//! .<name>.v2.bin.tmp   in-flight write, renamed over the current file
//! ```
//!
//! Every operation runs under the store's mutex, so reads, writes and
//! deletes of the same store never interleave.  The mutex is blocking;
//! callers on an async runtime go through `run_blocking`.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::{remove_if_present, temp_path, validate_store_name, write_atomically};
use crate::auth::token::Authorization;
use crate::crypto::{envelope, legacy, CipherProvider, KeyManager};
use crate::errors::{BiometricStorageError, Result};
use crate::keystore::StoredKey;
use crate::policy::StorePolicy;

const CURRENT_SUFFIX: &str = ".v2.bin";
const LEGACY_SUFFIX: &str = ".txt";

/// Lifecycle of an initialized store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Initialized; may or may not hold a value.
    Ready,
    /// `delete` ran.  Reads return nothing until the next write.
    Deleted,
}

pub struct StorageFile {
    name: String,
    policy: StorePolicy,
    dir: PathBuf,
    keys: KeyManager,
    ciphers: CipherProvider,
    state: Mutex<FileState>,
}

impl StorageFile {
    /// Validate the name and policy and bind the store to `dir`.
    ///
    /// Nothing is written until the first `write`; keys are generated
    /// lazily too.  A key left from an earlier run must have been
    /// generated under the same policy.
    pub fn init(
        name: &str,
        policy: StorePolicy,
        dir: impl Into<PathBuf>,
        keys: KeyManager,
        ciphers: CipherProvider,
    ) -> Result<Self> {
        validate_store_name(name)?;
        policy.validate()?;
        keys.ensure_policy(name, &policy)?;

        Ok(Self {
            name: name.to_string(),
            policy,
            dir: dir.into(),
            keys,
            ciphers,
            state: Mutex::new(FileState::Ready),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &StorePolicy {
        &self.policy
    }

    pub fn state(&self) -> FileState {
        *self.state.lock()
    }

    pub fn current_path(&self) -> PathBuf {
        self.dir.join(format!("{}{CURRENT_SUFFIX}", self.name))
    }

    pub fn legacy_path(&self) -> PathBuf {
        self.dir.join(format!("{}{LEGACY_SUFFIX}", self.name))
    }

    /// `true` if a current-format value is on disk.
    pub fn exists(&self) -> bool {
        self.current_path().is_file()
    }

    /// `true` if a read could return a value, in either format.
    ///
    /// Used to skip the prompt when there is nothing to decrypt.
    pub fn has_content(&self) -> bool {
        if *self.state.lock() == FileState::Deleted {
            return false;
        }
        self.exists() || (self.policy.permits_legacy() && self.legacy_path().is_file())
    }

    /// Read and decrypt the stored value.
    ///
    /// A legacy document is decrypted, rewritten in the current format and
    /// removed.  If the key was invalidated the store's files and key are
    /// deleted before the error is returned.
    pub fn read(
        &self,
        authorization: &Authorization,
        enrollment: Option<&str>,
    ) -> Result<Option<String>> {
        let mut state = self.state.lock();
        if *state == FileState::Deleted {
            return Ok(None);
        }

        let result = if self.exists() {
            self.read_current(authorization, enrollment)
        } else if self.legacy_path().is_file() {
            self.read_legacy(authorization, enrollment)
        } else {
            Ok(None)
        };

        if let Err(BiometricStorageError::KeyInvalidated(alias)) = &result {
            warn!(
                store = %self.name,
                alias = %alias,
                "key was invalidated by an enrollment change; discarding stored data"
            );
            self.delete_locked(&mut state);
        }
        result
    }

    /// Encrypt `content` and replace the stored value.
    ///
    /// If the key was invalidated, the stale data is dropped and the write
    /// is retried once with a fresh key.
    pub fn write(
        &self,
        content: &str,
        authorization: &Authorization,
        enrollment: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.lock();

        match self.write_current(content, authorization, enrollment) {
            Err(BiometricStorageError::KeyInvalidated(alias)) => {
                warn!(
                    store = %self.name,
                    alias = %alias,
                    "key was invalidated by an enrollment change; recreating it"
                );
                self.delete_locked(&mut state);
                self.write_current(content, authorization, enrollment)?;
            }
            other => other?,
        }

        self.remove_legacy();
        *state = FileState::Ready;
        Ok(())
    }

    /// Delete the value in both formats and the store's key.
    ///
    /// Returns `true` if any value file was removed.  Never fails.
    pub fn delete(&self) -> bool {
        let mut state = self.state.lock();
        self.delete_locked(&mut state)
    }

    fn delete_locked(&self, state: &mut FileState) -> bool {
        let current = remove_logged(&self.current_path());
        let legacy = remove_logged(&self.legacy_path());
        let tmp = remove_logged(&temp_path(&self.current_path()));
        let key = self.keys.delete_key(&self.name);
        *state = FileState::Deleted;

        debug!(store = %self.name, current, legacy, tmp, key, "deleted store");
        current || legacy
    }

    fn read_current(
        &self,
        authorization: &Authorization,
        enrollment: Option<&str>,
    ) -> Result<Option<String>> {
        let path = self.current_path();
        let bytes = read_file(&path)?;
        let (nonce, ciphertext) = envelope::decode(&bytes)?;

        let key = self.key_for_existing_data()?;
        let plaintext = self
            .ciphers
            .cipher_for_decrypt(&key, nonce, authorization, enrollment)?
            .open(ciphertext)?;

        envelope::decode_plaintext(take(plaintext)).map(Some)
    }

    fn read_legacy(
        &self,
        authorization: &Authorization,
        enrollment: Option<&str>,
    ) -> Result<Option<String>> {
        if !self.policy.permits_legacy() {
            warn!(
                store = %self.name,
                "ignoring legacy file: stores that authenticate every operation cannot read it"
            );
            return Ok(None);
        }

        let payload = legacy::parse(&read_file(&self.legacy_path())?)?;
        let key = self.key_for_existing_data()?;
        let info = legacy::content_info(self.keys.namespace(), &self.name);
        let plaintext = self
            .ciphers
            .cipher_for_legacy_decrypt(
                &key,
                &payload.salt,
                &info,
                &payload.nonce,
                authorization,
                enrollment,
            )?
            .open(&payload.ciphertext)?;
        let content = Zeroizing::new(envelope::decode_plaintext(take(plaintext))?);

        match self.write_current(&content, authorization, enrollment) {
            Ok(()) => {
                self.remove_legacy();
                info!(store = %self.name, "migrated legacy file to the current format");
            }
            Err(e) => {
                warn!(store = %self.name, error = %e, "legacy migration failed; keeping legacy file");
            }
        }

        Ok(Some(content.to_string()))
    }

    fn write_current(
        &self,
        content: &str,
        authorization: &Authorization,
        enrollment: Option<&str>,
    ) -> Result<()> {
        let key = self
            .keys
            .get_or_create_key(&self.name, &self.policy, enrollment)?;
        let cipher = self
            .ciphers
            .cipher_for_encrypt(&key, authorization, enrollment)?;

        let nonce = *cipher.nonce();
        let ciphertext = cipher.seal(envelope::encode_plaintext(content))?;
        write_atomically(&self.current_path(), &envelope::encode(&nonce, &ciphertext))?;

        debug!(store = %self.name, bytes = content.len(), "wrote store");
        Ok(())
    }

    /// Data on disk without its key can never be decrypted again.
    fn key_for_existing_data(&self) -> Result<StoredKey> {
        self.keys
            .existing_key(&self.name)?
            .ok_or_else(|| BiometricStorageError::KeyInvalidated(self.keys.key_alias(&self.name)))
    }

    fn remove_legacy(&self) {
        remove_logged(&self.legacy_path());
    }
}

impl std::fmt::Debug for StorageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageFile")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("dir", &self.dir)
            .field("state", &self.state())
            .finish()
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| BiometricStorageError::File {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_logged(path: &Path) -> bool {
    match remove_if_present(path) {
        Ok(removed) => removed,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove file");
            false
        }
    }
}

/// Move decrypted bytes out of their wrapper without copying them.
fn take(mut plaintext: Zeroizing<Vec<u8>>) -> Vec<u8> {
    std::mem::take(&mut *plaintext)
}
