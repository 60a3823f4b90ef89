//! Authenticator that plays back scripted prompt outcomes.
//!
//! Used to drive the gate without a real prompt: each `authenticate`
//! call takes the next script, and an empty queue means "biometric
//! success".

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::authenticator::{AuthEvent, AuthEvents, Authenticator, CanAuthenticate};
use super::prompt::AuthRequest;
use super::token::AuthMethod;
use crate::errors::AuthErrorKind;

/// What one prompt does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Report these events immediately, in order.
    Events(Vec<AuthEvent>),
    /// Report these events after a delay, from a separate task.
    Delayed(Duration, Vec<AuthEvent>),
    /// Never answer until `release_hung` is called.
    Hang,
}

impl Script {
    pub fn succeed(method: AuthMethod) -> Self {
        Self::Events(vec![AuthEvent::Succeeded(method)])
    }

    pub fn cancel() -> Self {
        Self::Events(vec![AuthEvent::Error(
            AuthErrorKind::UserCanceled,
            "negative button pressed".into(),
        )])
    }

    pub fn fail(kind: AuthErrorKind) -> Self {
        Self::Events(vec![AuthEvent::Error(kind, format!("scripted {kind}"))])
    }
}

#[derive(Debug)]
pub struct ScriptedAuthenticator {
    scripts: Mutex<VecDeque<Script>>,
    status: Mutex<CanAuthenticate>,
    enrollment: Mutex<Option<String>>,
    requests: Mutex<Vec<AuthRequest>>,
    hung: Mutex<Vec<AuthEvents>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    canceled: AtomicBool,
}

impl ScriptedAuthenticator {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            status: Mutex::new(CanAuthenticate::Success),
            enrollment: Mutex::new(Some("enrollment-1".into())),
            requests: Mutex::new(Vec::new()),
            hung: Mutex::new(Vec::new()),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            canceled: AtomicBool::new(false),
        }
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    pub fn set_status(&self, status: CanAuthenticate) {
        *self.status.lock() = status;
    }

    /// Simulate the user adding or removing a fingerprint.
    pub fn set_enrollment(&self, enrollment: Option<&str>) {
        *self.enrollment.lock() = enrollment.map(str::to_string);
    }

    pub fn prompt_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<AuthRequest> {
        self.requests.lock().clone()
    }

    /// Highest number of prompts that were visible at the same time.
    pub fn max_concurrent_prompts(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn was_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Answer every hung prompt with `event`.
    pub fn release_hung(&self, event: AuthEvent) {
        for events in self.hung.lock().drain(..) {
            let _ = events.send(event.clone());
        }
    }

    fn begin(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }
}

impl Default for ScriptedAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator for ScriptedAuthenticator {
    fn can_authenticate(&self) -> CanAuthenticate {
        *self.status.lock()
    }

    fn enrollment_id(&self) -> Option<String> {
        self.enrollment.lock().clone()
    }

    fn authenticate(&self, request: AuthRequest, events: AuthEvents) {
        self.requests.lock().push(request);
        self.begin();

        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Script::succeed(AuthMethod::Biometric));

        match script {
            Script::Events(list) => {
                for event in list {
                    let _ = events.send(event);
                }
                self.active.fetch_sub(1, Ordering::SeqCst);
            }
            Script::Delayed(delay, list) => {
                let active = self.active.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    for event in list {
                        let _ = events.send(event);
                    }
                });
            }
            Script::Hang => {
                self.hung.lock().push(events);
            }
        }
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        if self.active.load(Ordering::SeqCst) > 0 {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
