//! Dispatch Façade: named operations in, results or coded errors out.
//!
//! The host's method channel carries an operation name and a JSON
//! argument map.  `BiometricStorage::handle` decodes the arguments into
//! typed structs, runs the operation on the selected backend, and turns
//! the outcome back into a `MethodResponse`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::auth::{Authenticator, CanAuthenticate, PromptHost, PromptInfo, SystemClock};
use crate::config::Settings;
use crate::errors::{BiometricStorageError, Result};
use crate::keystore::FileKeyStore;
use crate::storage::{
    AuthenticatedCipherBackend, BackendKind, CredentialBackend, InitOptions, LocalBackend,
    StorageBackend,
};

/// One request from the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// The error channel: `(code, message, details?)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&BiometricStorageError> for MethodError {
    fn from(e: &BiometricStorageError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "camelCase")]
pub enum MethodResponse {
    Success(Value),
    Error(MethodError),
    NotImplemented,
}

impl MethodResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitArgs {
    name: String,
    #[serde(default)]
    options: InitOptions,
    #[serde(default)]
    force_init: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreArgs {
    name: String,
    #[serde(default)]
    prompt_info: PromptInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteArgs {
    name: String,
    content: String,
    #[serde(default)]
    prompt_info: PromptInfo,
}

#[derive(Debug, Deserialize)]
struct NameArgs {
    name: String,
}

fn parse_args<T: DeserializeOwned>(method: &str, arguments: Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| BiometricStorageError::BadArguments(format!("{method}: {e}")))
}

/// Front door for every storage operation.
pub struct BiometricStorage {
    backend: Arc<dyn StorageBackend>,
    host: Arc<PromptHost>,
}

impl BiometricStorage {
    pub fn new(backend: Arc<dyn StorageBackend>, host: Arc<PromptHost>) -> Self {
        Self { backend, host }
    }

    /// Build the backend named by `settings` (or detected for this
    /// platform) with real time and the given prompt.
    pub fn from_settings(settings: &Settings, authenticator: Arc<dyn Authenticator>) -> Result<Self> {
        let host = PromptHost::new();
        let clock = Arc::new(SystemClock);
        let kind = settings.backend();

        let backend: Arc<dyn StorageBackend> = match kind {
            BackendKind::Authenticated => Arc::new(AuthenticatedCipherBackend::new(
                settings.storage_dir(),
                &settings.namespace,
                Arc::new(FileKeyStore::new(settings.keys_dir())),
                authenticator,
                clock,
                host.clone(),
            )),
            BackendKind::Credential => Arc::new(CredentialBackend::new(
                &settings.namespace,
                credential_store(&settings.namespace)?,
                authenticator,
                clock,
                host.clone(),
            )),
            BackendKind::Local => Arc::new(LocalBackend::new(settings.storage_dir())),
        };
        debug!(backend = kind.as_str(), "selected storage backend");

        Ok(Self::new(backend, host))
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    /// The UI prompts are shown in; detach it when the UI goes away.
    pub fn prompt_host(&self) -> &Arc<PromptHost> {
        &self.host
    }

    pub fn can_authenticate(&self) -> CanAuthenticate {
        self.backend.can_authenticate()
    }

    pub async fn init(&self, name: &str, options: &InitOptions, force_init: bool) -> Result<bool> {
        self.backend.init(name, options, force_init).await
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        self.backend.exists(name).await
    }

    pub async fn read(&self, name: &str, prompt: &PromptInfo) -> Result<Option<String>> {
        self.backend.read(name, prompt).await
    }

    pub async fn write(&self, name: &str, content: &str, prompt: &PromptInfo) -> Result<()> {
        self.backend.write(name, content, prompt).await
    }

    pub async fn delete(&self, name: &str, prompt: &PromptInfo) -> Result<bool> {
        self.backend.delete(name, prompt).await
    }

    pub async fn dispose(&self, name: &str) -> Result<bool> {
        self.backend.dispose(name).await
    }

    /// Run one named operation.
    pub async fn handle(&self, call: MethodCall) -> MethodResponse {
        let MethodCall { method, arguments } = call;
        debug!(method = %method, "dispatching");

        match self.dispatch(&method, arguments).await {
            Ok(Some(value)) => MethodResponse::Success(value),
            Ok(None) => {
                warn!(method = %method, "unknown method");
                MethodResponse::NotImplemented
            }
            Err(e) => {
                if e.is_auth_cancellation() {
                    debug!(method = %method, error = %e, "authentication canceled");
                } else if method == "write" {
                    error!(method = %method, code = %e.code(), error = %e, "write failed");
                } else {
                    warn!(method = %method, code = %e.code(), error = %e, "operation failed");
                }
                MethodResponse::Error(MethodError::from(&e))
            }
        }
    }

    /// `Ok(None)` means the method does not exist.
    async fn dispatch(&self, method: &str, arguments: Value) -> Result<Option<Value>> {
        let value = match method {
            "canAuthenticate" => json!(self.can_authenticate().as_str()),
            "init" => {
                let args: InitArgs = parse_args(method, arguments)?;
                json!(self.init(&args.name, &args.options, args.force_init).await?)
            }
            "exists" => {
                let args: NameArgs = parse_args(method, arguments)?;
                json!(self.exists(&args.name).await?)
            }
            "read" => {
                let args: StoreArgs = parse_args(method, arguments)?;
                json!(self.read(&args.name, &args.prompt_info).await?)
            }
            "write" => {
                let args: WriteArgs = parse_args(method, arguments)?;
                let content = zeroize::Zeroizing::new(args.content);
                self.write(&args.name, &content, &args.prompt_info).await?;
                Value::Null
            }
            "delete" => {
                let args: StoreArgs = parse_args(method, arguments)?;
                json!(self.delete(&args.name, &args.prompt_info).await?)
            }
            "dispose" => {
                let args: NameArgs = parse_args(method, arguments)?;
                json!(self.dispose(&args.name).await?)
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }
}

#[cfg(feature = "keyring-store")]
fn credential_store(namespace: &str) -> Result<Arc<dyn crate::storage::CredentialStore>> {
    Ok(Arc::new(crate::storage::credential::KeyringCredentialStore::new(
        namespace,
    )))
}

#[cfg(not(feature = "keyring-store"))]
fn credential_store(_namespace: &str) -> Result<Arc<dyn crate::storage::CredentialStore>> {
    Err(BiometricStorageError::ConfigError(
        "the credential backend needs the `keyring-store` feature".into(),
    ))
}
