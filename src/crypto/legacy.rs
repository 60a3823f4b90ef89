//! Legacy storage format, kept only so old values can be migrated.
//!
//! Before the envelope format, a value was stored as a JSON text document
//! with base64 fields:
//!
//! ```text
//! { "salt": "<32 bytes>", "iv": "<12 bytes>", "ciphertext": "<ciphertext ‖ tag>" }
//! ```
//!
//! The content key is HKDF-SHA256 expanded from the store key, using the
//! document's salt and an `info` string bound to the store name.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::envelope::NONCE_LEN;
use crate::errors::{BiometricStorageError, Result};

/// Length of the legacy per-document salt.
pub const SALT_LEN: usize = 32;

const KEY_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
struct LegacyDocument {
    salt: String,
    iv: String,
    ciphertext: String,
}

/// A parsed legacy document.
#[derive(Debug)]
pub struct LegacyPayload {
    pub salt: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

/// `info` string the content key is bound to.
pub fn content_info(namespace: &str, name: &str) -> String {
    format!("{namespace}-legacy:{name}")
}

/// Parse the JSON document.
pub fn parse(bytes: &[u8]) -> Result<LegacyPayload> {
    let document: LegacyDocument = serde_json::from_slice(bytes)
        .map_err(|e| BiometricStorageError::CorruptEnvelope(format!("legacy document: {e}")))?;

    let salt = decode_field("salt", &document.salt)?;
    let iv = decode_field("iv", &document.iv)?;
    let ciphertext = decode_field("ciphertext", &document.ciphertext)?;

    let nonce: [u8; NONCE_LEN] = iv.as_slice().try_into().map_err(|_| {
        BiometricStorageError::CorruptEnvelope(format!(
            "legacy iv must be {NONCE_LEN} bytes, got {}",
            iv.len()
        ))
    })?;

    Ok(LegacyPayload {
        salt,
        nonce,
        ciphertext,
    })
}

/// Derive the AES-256 content key for a legacy document.
pub(crate) fn derive_content_key(
    store_key: &[u8],
    salt: &[u8],
    info: &str,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), store_key);

    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(info.as_bytes(), okm.as_mut_slice())
        .map_err(|e| BiometricStorageError::KeyStore(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}

/// Write a value in the legacy format.
///
/// Nothing in the storage path produces legacy documents any more; this
/// exists to build migration fixtures.
pub fn seal(
    key: &crate::keystore::StoredKey,
    namespace: &str,
    name: &str,
    plaintext: &str,
) -> Result<Vec<u8>> {
    use aes_gcm::aead::rand_core::RngCore;
    use aes_gcm::aead::{Aead, KeyInit, OsRng};
    use aes_gcm::{AeadCore, Aes256Gcm};

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let content_key =
        derive_content_key(key.material.as_slice(), &salt, &content_info(namespace, name))?;
    let cipher = Aes256Gcm::new_from_slice(content_key.as_slice())
        .map_err(|e| BiometricStorageError::EncryptionFailed(format!("invalid key: {e}")))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| BiometricStorageError::EncryptionFailed(format!("encryption error: {e}")))?;

    let document = LegacyDocument {
        salt: BASE64.encode(salt),
        iv: BASE64.encode(nonce),
        ciphertext: BASE64.encode(ciphertext),
    };
    serde_json::to_vec(&document)
        .map_err(|e| BiometricStorageError::SerializationError(format!("legacy document: {e}")))
}

fn decode_field(field: &str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| BiometricStorageError::CorruptEnvelope(format!("legacy {field}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{KeyStore, MemoryKeyStore};
    use crate::policy::StorePolicy;

    #[test]
    fn sealed_document_parses() {
        let keys = MemoryKeyStore::new();
        let key = keys
            .generate_key("ns.old", &StorePolicy::unauthenticated(), None)
            .unwrap();

        let bytes = seal(&key, "ns", "old", "legacy value").unwrap();
        let payload = parse(&bytes).unwrap();
        assert_eq!(payload.salt.len(), SALT_LEN);
        assert_eq!(payload.ciphertext.len(), "legacy value".len() + 16);
    }

    #[test]
    fn parse_rejects_bad_iv_length() {
        let doc = format!(
            r#"{{"salt":"{}","iv":"{}","ciphertext":"{}"}}"#,
            BASE64.encode([0u8; SALT_LEN]),
            BASE64.encode([0u8; 8]),
            BASE64.encode([0u8; 20])
        );
        assert!(matches!(
            parse(doc.as_bytes()),
            Err(BiometricStorageError::CorruptEnvelope(_))
        ));
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(parse(b"\x00\x01binary").is_err());
    }

    #[test]
    fn content_key_depends_on_info() {
        let a = derive_content_key(&[1u8; 32], &[2u8; SALT_LEN], "ns-legacy:a").unwrap();
        let b = derive_content_key(&[1u8; 32], &[2u8; SALT_LEN], "ns-legacy:b").unwrap();
        assert_ne!(a, b);
    }
}
