//! Authentication Gate and the platform prompt seam.
//!
//! This module provides:
//! - The `Authenticator` trait and capability probe (`authenticator`)
//! - The per-store gate with its cached context (`gate`)
//! - Prompt configuration from the caller (`prompt`)
//! - Authorization tokens consumed by the cipher provider (`token`)
//! - An injectable time source (`clock`)
//! - Terminal and scripted authenticators (`terminal`, `scripted`)

pub mod authenticator;
pub mod clock;
pub mod gate;
pub mod prompt;
pub mod scripted;
pub mod terminal;
pub mod token;

pub use authenticator::{AuthEvent, Authenticator, CanAuthenticate, NoopAuthenticator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::{AuthGate, AuthState, PromptHost};
pub use prompt::{AuthRequest, PromptInfo, Purpose};
pub use scripted::{Script, ScriptedAuthenticator};
pub use terminal::TerminalAuthenticator;
pub use token::{AuthMethod, AuthToken, Authorization};
