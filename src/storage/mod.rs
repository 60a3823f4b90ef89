//! Storage backends.
//!
//! This module provides:
//! - The `StorageBackend` capability every platform variant implements
//! - The per-store `StorageFile` state machine (`file`)
//! - Backends: authenticated cipher (`authenticated`), OS credential
//!   store (`credential`), transparent local files (`local`)

pub mod authenticated;
pub mod credential;
pub mod file;
pub mod local;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::{CanAuthenticate, PromptInfo};
use crate::errors::{BiometricStorageError, Result};
use crate::policy::StorePolicy;

pub use authenticated::AuthenticatedCipherBackend;
pub use credential::{CredentialBackend, CredentialStore, MemoryCredentialStore};
pub use file::{FileState, StorageFile};
pub use local::LocalBackend;

/// Options a store is initialized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitOptions {
    pub authentication_required: bool,
    pub android_biometric_only: bool,
    pub darwin_biometric_only: bool,
    pub authentication_validity_duration_seconds: Option<i64>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            authentication_required: true,
            android_biometric_only: true,
            darwin_biometric_only: true,
            authentication_validity_duration_seconds: None,
        }
    }
}

impl InitOptions {
    pub fn unauthenticated() -> Self {
        Self {
            authentication_required: false,
            ..Self::default()
        }
    }

    /// Policy using the Android biometric flag.
    pub fn android_policy(&self) -> StorePolicy {
        StorePolicy::from_options(
            self.authentication_required,
            self.android_biometric_only,
            self.authentication_validity_duration_seconds,
        )
    }

    /// Policy using the Apple biometric flag.
    pub fn darwin_policy(&self) -> StorePolicy {
        StorePolicy::from_options(
            self.authentication_required,
            self.darwin_biometric_only,
            self.authentication_validity_duration_seconds,
        )
    }
}

/// Which backend serves the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Key store + AES-GCM envelope files, gated per key policy.
    Authenticated,
    /// OS credential store gated by a reusable authentication context.
    Credential,
    /// Plain files, no authentication.
    Local,
}

impl BackendKind {
    /// Pick the backend matching the platform we run on.
    pub fn detect() -> Self {
        if cfg!(target_os = "android") {
            Self::Authenticated
        } else if cfg!(feature = "keyring-store") {
            Self::Credential
        } else {
            Self::Authenticated
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::Credential => "credential",
            Self::Local => "local",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = BiometricStorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "authenticated" => Ok(Self::Authenticated),
            "credential" => Ok(Self::Credential),
            "local" => Ok(Self::Local),
            other => Err(BiometricStorageError::ConfigError(format!(
                "unknown backend '{other}' (expected authenticated, credential or local)"
            ))),
        }
    }
}

/// One platform's way of storing named values.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Capability probe; never prompts.
    fn can_authenticate(&self) -> CanAuthenticate;

    /// Register a store.  Returns `true` if it was newly created.
    ///
    /// Re-initializing a known name returns `false`, or fails with
    /// `AlreadyInitialized` when `force_init` is set.
    async fn init(&self, name: &str, options: &InitOptions, force_init: bool) -> Result<bool>;

    async fn exists(&self, name: &str) -> Result<bool>;

    async fn read(&self, name: &str, prompt: &PromptInfo) -> Result<Option<String>>;

    async fn write(&self, name: &str, content: &str, prompt: &PromptInfo) -> Result<()>;

    async fn delete(&self, name: &str, prompt: &PromptInfo) -> Result<bool>;

    /// Forget the store and any cached authentication.  Data stays.
    async fn dispose(&self, name: &str) -> Result<bool>;
}

/// Validate that a store name is safe to use in file names and aliases.
///
/// Allowed: ASCII letters, digits, underscores, hyphens, periods.
/// Must be non-empty, not start with a period, and be at most 256
/// characters.
pub fn validate_store_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BiometricStorageError::BadArguments(
            "store name cannot be empty".into(),
        ));
    }
    if name.len() > 256 {
        return Err(BiometricStorageError::BadArguments(
            "store name cannot exceed 256 characters".into(),
        ));
    }
    if name.starts_with('.') {
        return Err(BiometricStorageError::BadArguments(format!(
            "store name '{name}' cannot start with a period"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(BiometricStorageError::BadArguments(format!(
            "store name '{name}' contains invalid characters; only ASCII letters, digits, underscores, hyphens, and periods are allowed"
        )));
    }
    Ok(())
}

/// Run blocking crypto and file work off the async executor.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BiometricStorageError::CommandFailed(format!("storage worker failed: {e}")))?
}

/// Replace `path` atomically: write a sibling temp file, then rename it
/// over the target so readers never see a half-written value.  The temp
/// file is removed if either step fails.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_error = |source| BiometricStorageError::File {
        path: path.to_path_buf(),
        source,
    };

    let parent = path.parent().unwrap_or(Path::new("."));
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(file_error)?;
    }

    let tmp_path = temp_path(path);
    let written = write_owner_only(&tmp_path, bytes).and_then(|()| fs::rename(&tmp_path, path));
    if let Err(source) = written {
        let _ = remove_if_present(&tmp_path);
        return Err(file_error(source));
    }
    Ok(())
}

/// Sibling used by `write_atomically` while `path` is being replaced.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ))
}

/// Create `path` readable by the owner only and write `bytes` to it.
///
/// The mode is set when the file is created, so the contents are never
/// visible under looser permissions.  A leftover file is replaced.
pub(crate) fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    remove_if_present(path)?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

pub(crate) fn remove_if_present(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
