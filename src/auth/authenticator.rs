//! The platform prompt seam.
//!
//! Platform prompts are callback driven: they are started, then report
//! zero or more non-terminal events followed by one terminal event.  An
//! `Authenticator` mirrors that shape by pushing `AuthEvent`s into a
//! channel; the gate turns the channel into a future.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use super::prompt::AuthRequest;
use super::token::AuthMethod;
use crate::errors::AuthErrorKind;

/// Result of the capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanAuthenticate {
    Success,
    ErrorHwUnavailable,
    ErrorNoBiometricEnrolled,
    ErrorNoHardware,
    ErrorPasscodeNotSet,
    ErrorStatusUnknown,
    Unsupported,
}

impl CanAuthenticate {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::ErrorHwUnavailable => "ErrorHwUnavailable",
            Self::ErrorNoBiometricEnrolled => "ErrorNoBiometricEnrolled",
            Self::ErrorNoHardware => "ErrorNoHardware",
            Self::ErrorPasscodeNotSet => "ErrorPasscodeNotSet",
            Self::ErrorStatusUnknown => "ErrorStatusUnknown",
            Self::Unsupported => "Unsupported",
        }
    }
}

/// Progress reported by a running prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Biometric not recognized; the prompt stays up and lets the user retry.
    NotRecognized,
    Succeeded(AuthMethod),
    Error(AuthErrorKind, String),
}

/// Sender half handed to a running prompt.
pub type AuthEvents = UnboundedSender<AuthEvent>;

/// A platform authentication prompt.
pub trait Authenticator: Send + Sync {
    /// Probe whether authentication is possible.  Must not prompt.
    fn can_authenticate(&self) -> CanAuthenticate;

    /// Identifier of the current biometric enrollment.  Changes when
    /// fingerprints or faces are added or removed.
    fn enrollment_id(&self) -> Option<String>;

    /// Show the prompt and return immediately; the outcome is reported
    /// through `events`.  Sends after the receiver is gone are discarded.
    fn authenticate(&self, request: AuthRequest, events: AuthEvents);

    /// Dismiss a visible prompt, if any.
    fn cancel(&self) {}
}

/// Authenticator for hosts without any authentication hardware.
#[derive(Debug, Clone, Copy)]
pub struct NoopAuthenticator {
    status: CanAuthenticate,
}

impl NoopAuthenticator {
    pub fn new(status: CanAuthenticate) -> Self {
        Self { status }
    }
}

impl Default for NoopAuthenticator {
    fn default() -> Self {
        Self::new(CanAuthenticate::ErrorHwUnavailable)
    }
}

impl Authenticator for NoopAuthenticator {
    fn can_authenticate(&self) -> CanAuthenticate {
        self.status
    }

    fn enrollment_id(&self) -> Option<String> {
        None
    }

    fn authenticate(&self, _request: AuthRequest, events: AuthEvents) {
        let _ = events.send(AuthEvent::Error(
            AuthErrorKind::Unknown,
            "no authentication available on this device".into(),
        ));
    }
}
