//! Backend that encrypts each store with its own key-store key.
//!
//! Keys carry the store's authentication policy; a value is only ever
//! decrypted or written after the gate produced a matching
//! authorization.  This is how stores behave on Android.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::file::StorageFile;
use super::{run_blocking, BackendKind, InitOptions, StorageBackend};
use crate::auth::{AuthGate, AuthRequest, Authenticator, CanAuthenticate, Clock, PromptHost, PromptInfo};
use crate::crypto::{CipherProvider, KeyManager};
use crate::errors::{BiometricStorageError, Result};
use crate::keystore::KeyStore;
use crate::registry::StorageRegistry;

struct AuthenticatedStore {
    file: Arc<StorageFile>,
    gate: AuthGate,
}

pub struct AuthenticatedCipherBackend {
    dir: PathBuf,
    keys: KeyManager,
    ciphers: CipherProvider,
    authenticator: Arc<dyn Authenticator>,
    clock: Arc<dyn Clock>,
    host: Arc<PromptHost>,
    stores: StorageRegistry<AuthenticatedStore>,
}

impl AuthenticatedCipherBackend {
    pub fn new(
        dir: impl Into<PathBuf>,
        namespace: &str,
        keystore: Arc<dyn KeyStore>,
        authenticator: Arc<dyn Authenticator>,
        clock: Arc<dyn Clock>,
        host: Arc<PromptHost>,
    ) -> Self {
        Self {
            dir: dir.into(),
            keys: KeyManager::new(keystore, namespace),
            ciphers: CipherProvider::new(clock.clone()),
            authenticator,
            clock,
            host,
            stores: StorageRegistry::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The store's file, for inspection.
    pub fn storage_file(&self, name: &str) -> Result<Arc<StorageFile>> {
        Ok(self.stores.get(name)?.file.clone())
    }

    /// Obtain an authorization for one call on `store`.
    async fn authorize(
        &self,
        store: &AuthenticatedStore,
        prompt: &PromptInfo,
    ) -> Result<crate::auth::Authorization> {
        let policy = *store.file.policy();
        let request = AuthRequest::android(store.file.name(), prompt, &policy);
        store.gate.authenticate(&policy, request).await
    }
}

#[async_trait]
impl StorageBackend for AuthenticatedCipherBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Authenticated
    }

    fn can_authenticate(&self) -> CanAuthenticate {
        self.authenticator.can_authenticate()
    }

    async fn init(&self, name: &str, options: &InitOptions, force_init: bool) -> Result<bool> {
        let policy = options.android_policy();
        let created = self.stores.insert_with(name, || {
            let file = StorageFile::init(
                name,
                policy,
                self.dir.clone(),
                self.keys.clone(),
                self.ciphers.clone(),
            )?;
            Ok(AuthenticatedStore {
                file: Arc::new(file),
                gate: AuthGate::new(
                    name,
                    self.authenticator.clone(),
                    self.clock.clone(),
                    self.host.clone(),
                ),
            })
        })?;

        if !created {
            if force_init {
                return Err(BiometricStorageError::AlreadyInitialized(name.to_string()));
            }
            debug!(store = %name, "store already initialized");
            return Ok(false);
        }

        info!(
            store = %name,
            authentication_required = policy.authentication_required,
            biometric_only = policy.biometric_only,
            validity_secs = ?policy.validity_secs,
            "initialized store"
        );
        Ok(true)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let file = self.stores.get(name)?.file.clone();
        run_blocking(move || Ok(file.exists())).await
    }

    async fn read(&self, name: &str, prompt: &PromptInfo) -> Result<Option<String>> {
        let store = self.stores.get(name)?;

        let file = store.file.clone();
        if !run_blocking(move || Ok(file.has_content())).await? {
            debug!(store = %name, "nothing stored; skipping authentication");
            return Ok(None);
        }

        let authorization = self.authorize(&store, prompt).await?;
        let enrollment = store.gate.enrollment_id();
        let file = store.file.clone();
        run_blocking(move || file.read(&authorization, enrollment.as_deref())).await
    }

    async fn write(&self, name: &str, content: &str, prompt: &PromptInfo) -> Result<()> {
        let store = self.stores.get(name)?;

        let authorization = self.authorize(&store, prompt).await?;
        let enrollment = store.gate.enrollment_id();
        let file = store.file.clone();
        let content = Zeroizing::new(content.to_string());
        run_blocking(move || file.write(&content, &authorization, enrollment.as_deref())).await
    }

    async fn delete(&self, name: &str, _prompt: &PromptInfo) -> Result<bool> {
        let store = self.stores.get(name)?;
        store.gate.invalidate();

        let file = store.file.clone();
        run_blocking(move || Ok(file.delete())).await
    }

    async fn dispose(&self, name: &str) -> Result<bool> {
        match self.stores.remove(name) {
            Some(store) => {
                store.gate.invalidate();
                debug!(store = %name, "disposed store");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
