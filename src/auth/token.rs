//! Proof of a successful authentication, handed to the cipher provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the user authenticated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
    Biometric,
    DeviceCredential,
}

/// A successful authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthToken {
    pub method: AuthMethod,
    pub authenticated_at: DateTime<Utc>,
    /// Issued for the one storage call that prompted; never cached.
    pub per_operation: bool,
}

impl AuthToken {
    pub fn is_biometric(&self) -> bool {
        self.method == AuthMethod::Biometric
    }
}

/// Authorization passed along with a cipher request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authorization {
    /// No authentication happened for this call.
    #[default]
    None,
    Granted(AuthToken),
}

impl Authorization {
    pub fn token(&self) -> Option<&AuthToken> {
        match self {
            Self::None => None,
            Self::Granted(token) => Some(token),
        }
    }
}
