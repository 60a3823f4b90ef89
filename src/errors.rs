use std::path::PathBuf;

use serde_json::{json, Value};
use thiserror::Error;

/// Substring the Linux secret service puts in the message when a sandbox
/// (AppArmor, snap confinement) refuses the D-Bus call.
const APP_ARMOR_DENIED_MARKER: &str = "org.freedesktop.DBus.Error.AccessDenied";

/// Terminal outcome of an authentication attempt that did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// The user pressed the negative button or backed out of the prompt.
    UserCanceled,
    /// The system or the host dismissed the prompt (UI detached, another app).
    Canceled,
    /// The prompt timed out per platform policy.
    Timeout,
    /// A cipher was requested without a usable authentication.
    NotAuthenticated,
    /// Any other terminal failure (lockout, hardware error).
    Unknown,
}

impl AuthErrorKind {
    /// Sub-code used after `AuthError:` on the error channel.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserCanceled => "UserCanceled",
            Self::Canceled => "Canceled",
            Self::Timeout => "Timeout",
            Self::NotAuthenticated => "NotAuthenticated",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors that can occur in biometric storage.
#[derive(Debug, Error)]
pub enum BiometricStorageError {
    // --- Request errors ---
    #[error("Bad arguments: {0}")]
    BadArguments(String),

    #[error("Storage '{0}' was not initialized")]
    NotInitialized(String),

    #[error("Storage '{0}' is already initialized")]
    AlreadyInitialized(String),

    // --- Authentication errors ---
    #[error("Authentication failed: {kind}")]
    Auth { kind: AuthErrorKind, message: String },

    // --- Key errors ---
    #[error("Key '{0}' was permanently invalidated; stored data is unrecoverable")]
    KeyInvalidated(String),

    #[error("Key store error: {0}")]
    KeyStore(String),

    // --- Envelope / file errors ---
    #[error("Corrupt envelope: {0}")]
    CorruptEnvelope(String),

    #[error("Integrity check failed: stored data was tampered with or the key does not match")]
    Integrity,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Storage file error at {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- OS credential store errors ---
    #[error("Security error: {message} ({code}) ({domain})")]
    Security {
        domain: String,
        code: i64,
        message: String,
    },

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl BiometricStorageError {
    pub fn auth(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self::Auth {
            kind,
            message: message.into(),
        }
    }

    /// Stable code carried across the dispatch boundary.
    pub fn code(&self) -> String {
        match self {
            Self::BadArguments(_) => "BadArguments".into(),
            Self::NotInitialized(_) => "NotInitialized".into(),
            Self::AlreadyInitialized(_) => "AlreadyInitialized".into(),
            Self::Auth { kind, .. } => format!("AuthError:{kind}"),
            Self::KeyInvalidated(_) => "KeyInvalidated".into(),
            Self::KeyStore(_) => "KeyStoreError".into(),
            Self::CorruptEnvelope(_) => "CorruptEnvelope".into(),
            Self::Integrity => "IntegrityError".into(),
            Self::Security { message, .. } if message.contains(APP_ARMOR_DENIED_MARKER) => {
                "linuxAppArmorDenied".into()
            }
            Self::Security { .. } => "SecurityError".into(),
            Self::ConfigError(_) => "ConfigError".into(),
            Self::EncryptionFailed(_)
            | Self::File { .. }
            | Self::Io(_)
            | Self::SerializationError(_)
            | Self::CommandFailed(_) => "IOError".into(),
        }
    }

    /// Extra structured data for the error channel, if any.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Security {
                domain,
                code,
                message,
            } => Some(json!({ "domain": domain, "code": code, "message": message })),
            Self::File { path, source } => Some(json!({
                "path": path.display().to_string(),
                "kind": format!("{:?}", source.kind()),
            })),
            _ => None,
        }
    }

    /// `true` when the user (or the host) walked away from the prompt, as
    /// opposed to the device being unable to authenticate at all.
    pub fn is_auth_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Auth {
                kind: AuthErrorKind::UserCanceled | AuthErrorKind::Canceled | AuthErrorKind::Timeout,
                ..
            }
        )
    }
}

/// Convenience type alias for biometric storage results.
pub type Result<T> = std::result::Result<T, BiometricStorageError>;
