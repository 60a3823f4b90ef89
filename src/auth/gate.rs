//! Authentication Gate.
//!
//! Per store, the gate is a small state machine:
//!
//! ```text
//!   NoContext ──prompt──▶ Authenticating ──success──▶ Authenticated(expires_at)
//!       ▲                      │                             │
//!       └──────failure─────────┘◀──────── now >= expires_at ─┘
//! ```
//!
//! A context is only kept when the policy has a validity window.  Stores
//! that authenticate per operation go straight back to `NoContext` and
//! get a single-use token.
//!
//! The prompt itself is one shared UI resource.  Every gate created from
//! the same `PromptHost` takes the host's lock before showing a prompt,
//! so a second request waits for the first and then re-checks the cache.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::authenticator::{AuthEvent, Authenticator, CanAuthenticate};
use super::clock::Clock;
use super::prompt::AuthRequest;
use super::token::{AuthMethod, AuthToken, Authorization};
use crate::errors::{AuthErrorKind, BiometricStorageError, Result};
use crate::policy::StorePolicy;

/// State of one store's authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoContext,
    Authenticating,
    Authenticated {
        token: AuthToken,
        expires_at: DateTime<Utc>,
    },
}

/// `true` once a context has reached its expiry.
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= expires_at
}

/// The UI that prompts are shown in.
///
/// Shared by all gates: it owns the single-prompt lock and tracks whether
/// a UI is attached at all.
#[derive(Debug)]
pub struct PromptHost {
    prompt_lock: tokio::sync::Mutex<()>,
    attached: watch::Sender<bool>,
}

impl PromptHost {
    pub fn new() -> Arc<Self> {
        let (attached, _) = watch::channel(true);
        Arc::new(Self {
            prompt_lock: tokio::sync::Mutex::new(()),
            attached,
        })
    }

    /// The hosting UI went away.  Pending prompts resolve as canceled.
    pub fn detach(&self) {
        info!("prompt host detached");
        self.attached.send_replace(false);
    }

    pub fn attach(&self) {
        self.attached.send_replace(true);
    }

    pub fn is_attached(&self) -> bool {
        *self.attached.borrow()
    }
}

/// Drives the platform prompt for one store and caches its outcome.
pub struct AuthGate {
    store: String,
    authenticator: Arc<dyn Authenticator>,
    clock: Arc<dyn Clock>,
    host: Arc<PromptHost>,
    state: Mutex<AuthState>,
}

impl AuthGate {
    pub fn new(
        store: impl Into<String>,
        authenticator: Arc<dyn Authenticator>,
        clock: Arc<dyn Clock>,
        host: Arc<PromptHost>,
    ) -> Self {
        Self {
            store: store.into(),
            authenticator,
            clock,
            host,
            state: Mutex::new(AuthState::NoContext),
        }
    }

    pub fn state(&self) -> AuthState {
        *self.state.lock()
    }

    pub fn can_authenticate(&self) -> CanAuthenticate {
        self.authenticator.can_authenticate()
    }

    pub fn enrollment_id(&self) -> Option<String> {
        self.authenticator.enrollment_id()
    }

    /// Obtain an authorization for one storage call under `policy`.
    ///
    /// Reuses a live context without prompting when the policy has a
    /// validity window.  Otherwise shows the prompt; only terminal prompt
    /// outcomes are returned.
    pub async fn authenticate(
        &self,
        policy: &StorePolicy,
        request: AuthRequest,
    ) -> Result<Authorization> {
        if !policy.authentication_required {
            return Ok(Authorization::None);
        }

        if let Some(token) = self.cached(policy) {
            debug!(store = %self.store, "reusing authentication context");
            return Ok(Authorization::Granted(token));
        }

        let _prompt = self.host.prompt_lock.lock().await;

        // Whoever held the prompt before us may have authenticated this store.
        if let Some(token) = self.cached(policy) {
            debug!(store = %self.store, "authenticated while queued for the prompt");
            return Ok(Authorization::Granted(token));
        }

        *self.state.lock() = AuthState::Authenticating;
        let outcome = self.prompt(request).await;
        let mut state = self.state.lock();

        let method = match outcome {
            Ok(method) => method,
            Err(e) => {
                *state = AuthState::NoContext;
                debug!(store = %self.store, error = %e, "authentication failed");
                return Err(e);
            }
        };

        let now = self.clock.now();
        let token = AuthToken {
            method,
            authenticated_at: now,
            per_operation: !policy.allows_reuse(),
        };

        let next = match policy.validity_delta() {
            Ok(Some(validity)) if policy.allows_reuse() => now
                .checked_add_signed(validity)
                .map(|expires_at| AuthState::Authenticated { token, expires_at })
                .ok_or_else(|| {
                    BiometricStorageError::KeyStore(format!(
                        "validity window of store '{}' overflows the clock",
                        self.store
                    ))
                }),
            Ok(_) => Ok(AuthState::NoContext),
            Err(e) => Err(e),
        };
        match next {
            Ok(next) => *state = next,
            Err(e) => {
                *state = AuthState::NoContext;
                return Err(e);
            }
        }
        debug!(store = %self.store, ?method, "authenticated");

        Ok(Authorization::Granted(token))
    }

    /// Drop any cached context.
    pub fn invalidate(&self) {
        *self.state.lock() = AuthState::NoContext;
    }

    fn cached(&self, policy: &StorePolicy) -> Option<AuthToken> {
        if !policy.allows_reuse() {
            return None;
        }
        let mut state = self.state.lock();
        match *state {
            AuthState::Authenticated { token, expires_at } => {
                if is_expired(expires_at, self.clock.now()) {
                    debug!(store = %self.store, "authentication context expired");
                    *state = AuthState::NoContext;
                    None
                } else {
                    Some(token)
                }
            }
            AuthState::NoContext | AuthState::Authenticating => None,
        }
    }

    /// Run the platform prompt until it reports a terminal outcome.
    async fn prompt(&self, request: AuthRequest) -> Result<AuthMethod> {
        let mut attached = self.host.attached.subscribe();
        if !self.host.is_attached() {
            return Err(BiometricStorageError::auth(
                AuthErrorKind::Canceled,
                "no UI is attached to show the prompt",
            ));
        }

        let allow_device_credential = request.allow_device_credential;
        let (events, mut outcomes) = mpsc::unbounded_channel();
        self.authenticator.authenticate(request, events);

        loop {
            tokio::select! {
                event = outcomes.recv() => match event {
                    Some(AuthEvent::NotRecognized) => {
                        debug!(store = %self.store, "biometric not recognized, prompt retrying");
                    }
                    Some(AuthEvent::Succeeded(AuthMethod::DeviceCredential))
                        if !allow_device_credential =>
                    {
                        return Err(BiometricStorageError::auth(
                            AuthErrorKind::NotAuthenticated,
                            "device credential is not accepted for this store",
                        ));
                    }
                    Some(AuthEvent::Succeeded(method)) => return Ok(method),
                    Some(AuthEvent::Error(kind, message)) => {
                        return Err(BiometricStorageError::auth(kind, message));
                    }
                    None => {
                        return Err(BiometricStorageError::auth(
                            AuthErrorKind::Unknown,
                            "prompt closed without a result",
                        ));
                    }
                },
                changed = attached.changed() => {
                    if changed.is_err() || !*attached.borrow_and_update() {
                        self.authenticator.cancel();
                        return Err(BiometricStorageError::auth(
                            AuthErrorKind::Canceled,
                            "the prompt's UI was detached",
                        ));
                    }
                }
            }
        }
    }
}
