//! Backend over an OS credential store.
//!
//! Values live in the platform's secure credential store instead of
//! files:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring / KDE Wallet)
//!
//! The credential store itself does not prompt.  Stores that require
//! authentication go through an `AuthGate` whose context may be reused
//! for the store's validity window, which is how Apple's keychain
//! access control behaves.  Hosts that cannot authenticate at all only
//! get non-authenticated stores.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::{run_blocking, validate_store_name, BackendKind, InitOptions, StorageBackend};
use crate::auth::{
    AuthGate, AuthRequest, Authenticator, CanAuthenticate, Clock, PromptHost, PromptInfo, Purpose,
};
use crate::errors::{BiometricStorageError, Result};
use crate::policy::StorePolicy;
use crate::registry::StorageRegistry;

/// Secure credential container.  Calls may block on IPC.
pub trait CredentialStore: Send + Sync {
    fn get(&self, account: &str) -> Result<Option<String>>;

    fn set(&self, account: &str, value: &str) -> Result<()>;

    /// Returns `false` if there was nothing to remove.
    fn delete(&self, account: &str) -> Result<bool>;
}

/// The OS credential store, through the `keyring` crate.
#[cfg(feature = "keyring-store")]
pub struct KeyringCredentialStore {
    service: String,
}

#[cfg(feature = "keyring-store")]
impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, account).map_err(security_error)
    }
}

#[cfg(feature = "keyring-store")]
impl CredentialStore for KeyringCredentialStore {
    fn get(&self, account: &str) -> Result<Option<String>> {
        match self.entry(account)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(security_error(e)),
        }
    }

    fn set(&self, account: &str, value: &str) -> Result<()> {
        self.entry(account)?.set_password(value).map_err(security_error)
    }

    fn delete(&self, account: &str) -> Result<bool> {
        match self.entry(account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(security_error(e)),
        }
    }
}

/// Carry the platform's failure through as a security error.
#[cfg(feature = "keyring-store")]
fn security_error(e: keyring::Error) -> BiometricStorageError {
    let code = match &e {
        keyring::Error::PlatformFailure(_) => 1,
        keyring::Error::NoStorageAccess(_) => 2,
        keyring::Error::BadEncoding(_) => 3,
        keyring::Error::TooLong(..) => 4,
        keyring::Error::Invalid(..) => 5,
        keyring::Error::Ambiguous(_) => 6,
        _ => -1,
    };
    BiometricStorageError::Security {
        domain: "keyring".into(),
        code,
        message: e.to_string(),
    }
}

/// In-process credential store.  Can be told to fail like a real one.
#[derive(Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<String, Zeroizing<String>>>,
    failure: Mutex<Option<(i64, String)>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with this platform code and message.
    pub fn fail_with(&self, code: i64, message: impl Into<String>) {
        *self.failure.lock() = Some((code, message.into()));
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    pub fn contains(&self, account: &str) -> bool {
        self.values.lock().contains_key(account)
    }

    fn check(&self) -> Result<()> {
        match &*self.failure.lock() {
            Some((code, message)) => Err(BiometricStorageError::Security {
                domain: "memory".into(),
                code: *code,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, account: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.values.lock().get(account).map(|v| v.to_string()))
    }

    fn set(&self, account: &str, value: &str) -> Result<()> {
        self.check()?;
        self.values
            .lock()
            .insert(account.to_string(), Zeroizing::new(value.to_string()));
        Ok(())
    }

    fn delete(&self, account: &str) -> Result<bool> {
        self.check()?;
        Ok(self.values.lock().remove(account).is_some())
    }
}

struct CredentialEntry {
    account: String,
    policy: StorePolicy,
    gate: AuthGate,
}

pub struct CredentialBackend {
    namespace: String,
    store: Arc<dyn CredentialStore>,
    authenticator: Arc<dyn Authenticator>,
    clock: Arc<dyn Clock>,
    host: Arc<PromptHost>,
    entries: StorageRegistry<CredentialEntry>,
}

impl CredentialBackend {
    pub fn new(
        namespace: &str,
        store: Arc<dyn CredentialStore>,
        authenticator: Arc<dyn Authenticator>,
        clock: Arc<dyn Clock>,
        host: Arc<PromptHost>,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            store,
            authenticator,
            clock,
            host,
            entries: StorageRegistry::new(),
        }
    }

    /// Credential account a store's value is kept under.
    pub fn account(&self, name: &str) -> String {
        format!("{}.{name}", self.namespace)
    }

    async fn authorize(
        &self,
        name: &str,
        entry: &CredentialEntry,
        prompt: &PromptInfo,
        purpose: Purpose,
    ) -> Result<()> {
        let request = AuthRequest::darwin(name, prompt, &entry.policy, purpose);
        entry.gate.authenticate(&entry.policy, request).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for CredentialBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Credential
    }

    fn can_authenticate(&self) -> CanAuthenticate {
        self.authenticator.can_authenticate()
    }

    async fn init(&self, name: &str, options: &InitOptions, force_init: bool) -> Result<bool> {
        validate_store_name(name)?;
        let policy = options.darwin_policy();
        policy.validate()?;

        if policy.authentication_required
            && self.authenticator.can_authenticate() != CanAuthenticate::Success
        {
            return Err(BiometricStorageError::BadArguments(
                "this host only supports non-authenticated secure storage".into(),
            ));
        }

        let created = self.entries.insert_with(name, || {
            Ok(CredentialEntry {
                account: self.account(name),
                policy,
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
            return Ok(false);
        }

        info!(
            store = %name,
            account = %self.account(name),
            authentication_required = policy.authentication_required,
            "initialized credential store entry"
        );
        Ok(true)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let entry = self.entries.get(name)?;
        let store = self.store.clone();
        let account = entry.account.clone();
        run_blocking(move || Ok(store.get(&account)?.is_some())).await
    }

    async fn read(&self, name: &str, prompt: &PromptInfo) -> Result<Option<String>> {
        let entry = self.entries.get(name)?;

        let store = self.store.clone();
        let account = entry.account.clone();
        let value = run_blocking(move || Ok(store.get(&account)?.map(Zeroizing::new))).await?;

        let Some(value) = value else {
            debug!(store = %name, "no credential stored; skipping authentication");
            return Ok(None);
        };

        self.authorize(name, &entry, prompt, Purpose::Read).await?;
        Ok(Some(value.to_string()))
    }

    async fn write(&self, name: &str, content: &str, prompt: &PromptInfo) -> Result<()> {
        let entry = self.entries.get(name)?;
        self.authorize(name, &entry, prompt, Purpose::Write).await?;

        let store = self.store.clone();
        let account = entry.account.clone();
        let content = Zeroizing::new(content.to_string());
        run_blocking(move || store.set(&account, &content)).await?;

        debug!(store = %name, "stored credential");
        Ok(())
    }

    async fn delete(&self, name: &str, _prompt: &PromptInfo) -> Result<bool> {
        let entry = self.entries.get(name)?;
        entry.gate.invalidate();

        let store = self.store.clone();
        let account = entry.account.clone();
        run_blocking(move || store.delete(&account)).await
    }

    async fn dispose(&self, name: &str) -> Result<bool> {
        match self.entries.remove(name) {
            Some(entry) => {
                entry.gate.invalidate();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
