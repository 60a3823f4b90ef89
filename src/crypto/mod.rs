//! Cryptographic building blocks for the authenticated-cipher path.
//!
//! This module provides:
//! - Store key lifecycle on top of a `KeyStore` (`keys`)
//! - AES-256-GCM cipher objects gated by key policy (`cipher`)
//! - The `nonce ‖ ciphertext ‖ tag` on-disk envelope (`envelope`)
//! - The pre-envelope JSON format, read-only for migration (`legacy`)

pub mod cipher;
pub mod envelope;
pub mod keys;
pub mod legacy;

pub use cipher::{CipherProvider, DecryptCipher, EncryptCipher};
pub use envelope::{NONCE_LEN, TAG_LEN};
pub use keys::KeyManager;
