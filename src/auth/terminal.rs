//! Prompt on the controlling terminal.
//!
//! A terminal cannot read fingerprints, so a confirmation typed at the
//! terminal counts as a device-credential authentication.  Stores that
//! are biometric-only cannot be unlocked from here.

use dialoguer::Confirm;
use tracing::debug;

use super::authenticator::{AuthEvent, AuthEvents, Authenticator, CanAuthenticate};
use super::prompt::AuthRequest;
use super::token::AuthMethod;
use crate::errors::AuthErrorKind;

#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalAuthenticator;

impl TerminalAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

impl Authenticator for TerminalAuthenticator {
    fn can_authenticate(&self) -> CanAuthenticate {
        if console::Term::stderr().is_term() {
            CanAuthenticate::Success
        } else {
            CanAuthenticate::ErrorHwUnavailable
        }
    }

    fn enrollment_id(&self) -> Option<String> {
        None
    }

    fn authenticate(&self, request: AuthRequest, events: AuthEvents) {
        if !request.allow_device_credential {
            let _ = events.send(AuthEvent::Error(
                AuthErrorKind::Unknown,
                "biometric authentication is not available on a terminal".into(),
            ));
            return;
        }

        // The confirmation blocks on stdin; keep it off the runtime.
        std::thread::spawn(move || {
            let mut prompt = request.title.clone();
            if let Some(subtitle) = &request.subtitle {
                prompt = format!("{prompt}: {subtitle}");
            }
            debug!(store = %request.store, "showing terminal prompt");

            let event = match Confirm::new()
                .with_prompt(format!("{prompt} ('{}')", request.store))
                .default(false)
                .interact_opt()
            {
                Ok(Some(true)) => AuthEvent::Succeeded(AuthMethod::DeviceCredential),
                Ok(Some(false)) | Ok(None) => AuthEvent::Error(
                    AuthErrorKind::UserCanceled,
                    format!("{} pressed", request.negative_button),
                ),
                Err(e) => AuthEvent::Error(AuthErrorKind::Unknown, format!("terminal prompt: {e}")),
            };
            let _ = events.send(event);
        });
    }
}
