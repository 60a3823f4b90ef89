//! AES-256-GCM ciphers bound to a store key.
//!
//! The provider hands out single-use cipher objects.  An encrypt cipher
//! draws its own random 12-byte nonce when it is created and is consumed
//! by `seal`, so a nonce can never be used twice.  A decrypt cipher is
//! bound to the nonce read from the envelope.
//!
//! Before a cipher is built the provider checks what a hardware keystore
//! would enforce: the key has not been invalidated by an enrollment
//! change, and the caller's authorization satisfies the key's policy.

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use zeroize::Zeroizing;

use super::envelope::NONCE_LEN;
use super::legacy;
use crate::auth::clock::Clock;
use crate::auth::token::Authorization;
use crate::errors::{AuthErrorKind, BiometricStorageError, Result};
use crate::keystore::StoredKey;

/// Cipher in encrypt mode with a fresh nonce.
pub struct EncryptCipher {
    cipher: Aes256Gcm,
    nonce: [u8; NONCE_LEN],
}

impl EncryptCipher {
    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// Encrypt and authenticate `plaintext`, returning `ciphertext ‖ tag`.
    pub fn seal(self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(Nonce::from_slice(&self.nonce), plaintext)
            .map_err(|e| BiometricStorageError::EncryptionFailed(format!("encryption error: {e}")))
    }
}

/// Cipher in decrypt mode bound to the nonce that produced the ciphertext.
pub struct DecryptCipher {
    cipher: Aes256Gcm,
    nonce: [u8; NONCE_LEN],
}

impl DecryptCipher {
    /// Verify the tag and decrypt.  Any mismatch fails closed.
    pub fn open(self, ciphertext_with_tag: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.cipher
            .decrypt(Nonce::from_slice(&self.nonce), ciphertext_with_tag)
            .map(Zeroizing::new)
            .map_err(|_| BiometricStorageError::Integrity)
    }
}

/// Builds ciphers for store keys.
#[derive(Clone)]
pub struct CipherProvider {
    clock: Arc<dyn Clock>,
}

impl CipherProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Initialize a cipher in encrypt mode.  Each call draws a new nonce.
    pub fn cipher_for_encrypt(
        &self,
        key: &StoredKey,
        authorization: &Authorization,
        enrollment: Option<&str>,
    ) -> Result<EncryptCipher> {
        self.check_usable(key, authorization, enrollment)?;

        let cipher = build_cipher(key.material.as_slice())?;
        let generated = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(generated.as_slice());

        Ok(EncryptCipher { cipher, nonce })
    }

    /// Initialize a cipher in decrypt mode for the given envelope nonce.
    pub fn cipher_for_decrypt(
        &self,
        key: &StoredKey,
        nonce: &[u8; NONCE_LEN],
        authorization: &Authorization,
        enrollment: Option<&str>,
    ) -> Result<DecryptCipher> {
        self.check_usable(key, authorization, enrollment)?;

        Ok(DecryptCipher {
            cipher: build_cipher(key.material.as_slice())?,
            nonce: *nonce,
        })
    }

    /// Decrypt cipher for a legacy document, whose content key is derived
    /// from the store key and the document's salt.
    pub fn cipher_for_legacy_decrypt(
        &self,
        key: &StoredKey,
        salt: &[u8],
        info: &str,
        nonce: &[u8; NONCE_LEN],
        authorization: &Authorization,
        enrollment: Option<&str>,
    ) -> Result<DecryptCipher> {
        self.check_usable(key, authorization, enrollment)?;

        let content_key = legacy::derive_content_key(key.material.as_slice(), salt, info)?;
        Ok(DecryptCipher {
            cipher: build_cipher(content_key.as_slice())?,
            nonce: *nonce,
        })
    }

    /// What the platform keystore checks when a cipher is initialized.
    fn check_usable(
        &self,
        key: &StoredKey,
        authorization: &Authorization,
        enrollment: Option<&str>,
    ) -> Result<()> {
        let spec = &key.spec;
        if !spec.authentication_required {
            return Ok(());
        }

        if key.enrollment.as_deref() != enrollment {
            return Err(BiometricStorageError::KeyInvalidated(key.alias.clone()));
        }

        let token = authorization.token().ok_or_else(|| {
            BiometricStorageError::auth(
                AuthErrorKind::NotAuthenticated,
                format!("key '{}' requires user authentication", key.alias),
            )
        })?;

        if spec.biometric_only && !token.is_biometric() {
            return Err(BiometricStorageError::auth(
                AuthErrorKind::NotAuthenticated,
                format!("key '{}' only accepts biometric authentication", key.alias),
            ));
        }

        match spec.validity_delta()? {
            Some(validity) => {
                let expires_at = token
                    .authenticated_at
                    .checked_add_signed(validity)
                    .ok_or_else(|| {
                        BiometricStorageError::KeyStore(format!(
                            "validity window of key '{}' overflows the clock",
                            key.alias
                        ))
                    })?;
                if self.clock.now() >= expires_at {
                    return Err(BiometricStorageError::auth(
                        AuthErrorKind::NotAuthenticated,
                        format!("authentication for key '{}' has expired", key.alias),
                    ));
                }
            }
            None if !token.per_operation => {
                return Err(BiometricStorageError::auth(
                    AuthErrorKind::NotAuthenticated,
                    format!("key '{}' requires authentication for every use", key.alias),
                ));
            }
            None => {}
        }

        Ok(())
    }
}

fn build_cipher(key: &[u8]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key)
        .map_err(|e| BiometricStorageError::KeyStore(format!("invalid key length: {e}")))
}
