//! On-disk envelope for the authenticated-cipher path.
//!
//! Layout of a stored value:
//!   [ 12-byte nonce | ciphertext | 16-byte auth tag ]
//!
//! The cipher appends the tag to the ciphertext, so the codec only has to
//! split the nonce off the front.

use zeroize::Zeroize;

use crate::errors::{BiometricStorageError, Result};

/// Size of the AES-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the AES-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Concatenate `nonce ‖ ciphertext_with_tag`.
pub fn encode(nonce: &[u8; NONCE_LEN], ciphertext_with_tag: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(NONCE_LEN + ciphertext_with_tag.len());
    output.extend_from_slice(nonce);
    output.extend_from_slice(ciphertext_with_tag);
    output
}

/// Split an envelope into its nonce and `ciphertext ‖ tag`.
pub fn decode(bytes: &[u8]) -> Result<(&[u8; NONCE_LEN], &[u8])> {
    if bytes.len() < NONCE_LEN {
        return Err(BiometricStorageError::CorruptEnvelope(format!(
            "envelope is {} bytes, shorter than the {NONCE_LEN}-byte nonce",
            bytes.len()
        )));
    }
    let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
    let nonce = nonce
        .try_into()
        .map_err(|_| BiometricStorageError::CorruptEnvelope("bad nonce".into()))?;
    Ok((nonce, ciphertext))
}

/// Plaintext is stored as raw UTF-8; the tag bounds its integrity.
pub fn encode_plaintext(content: &str) -> &[u8] {
    content.as_bytes()
}

/// Turn decrypted bytes back into text, wiping them if they are not UTF-8.
pub fn decode_plaintext(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| {
        let mut bad_bytes = e.into_bytes();
        bad_bytes.zeroize();
        BiometricStorageError::CorruptEnvelope("stored value is not valid UTF-8".into())
    })
}
