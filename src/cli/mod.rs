//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use crate::auth::TerminalAuthenticator;
use crate::config::Settings;
use crate::dispatch::BiometricStorage;
use crate::errors::{BiometricStorageError, Result};
use crate::storage::{BackendKind, InitOptions};

/// Terminal host for biometric-gated secure storage.
#[derive(Parser)]
#[command(
    name = "biometric-storage",
    about = "Encrypted per-entry storage gated by user authentication",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding `biometric-storage.toml`
    #[arg(long, env = "BIOMETRIC_STORAGE_CONFIG_DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Directory for store files and keys (overrides config)
    #[arg(long, env = "BIOMETRIC_STORAGE_DIR", global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Storage backend: authenticated, credential or local (overrides config)
    #[arg(long, global = true)]
    pub backend: Option<String>,
}

/// Store policy used to initialize the store before the operation runs.
#[derive(clap::Args, Debug, Clone, Copy)]
pub struct PolicyArgs {
    /// Require user authentication to read or write the store
    #[arg(long)]
    pub auth_required: bool,

    /// Only accept biometric authentication (no PIN / password fallback)
    #[arg(long)]
    pub biometric_only: bool,

    /// Seconds an authentication stays valid (omit to authenticate every use)
    #[arg(long)]
    pub validity: Option<i64>,
}

impl PolicyArgs {
    pub fn init_options(&self) -> InitOptions {
        InitOptions {
            authentication_required: self.auth_required,
            android_biometric_only: self.biometric_only,
            darwin_biometric_only: self.biometric_only,
            authentication_validity_duration_seconds: self.validity,
        }
    }
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Check whether this host can authenticate the user
    CanAuthenticate,

    /// Print a store's value
    Read {
        /// Store name
        name: String,
        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Replace a store's value
    Write {
        /// Store name
        name: String,
        /// New value (omit for interactive prompt or piped stdin)
        content: Option<String>,
        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Delete a store's value and key
    Delete {
        /// Store name
        name: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// Send raw method calls; without a method, reads one JSON call per stdin line
    Call {
        /// Method name (e.g. init, read, write)
        method: Option<String>,
        /// JSON arguments
        arguments: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Load settings and apply command-line overrides.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match cli.config_dir.clone().or_else(Settings::default_config_dir) {
        Some(dir) => Settings::load(&dir)?,
        None => Settings::default(),
    };

    if let Some(dir) = &cli.storage_dir {
        settings.storage_dir = Some(dir.clone());
    }
    if let Some(backend) = &cli.backend {
        settings.backend = Some(backend.parse::<BackendKind>()?);
    }
    Ok(settings)
}

/// Build the storage façade with a terminal prompt.
pub fn open_storage(settings: &Settings) -> Result<BiometricStorage> {
    BiometricStorage::from_settings(settings, Arc::new(TerminalAuthenticator::new()))
}

/// Initialize `name` with the policy flags, tolerating an earlier init.
pub async fn init_store(storage: &BiometricStorage, name: &str, policy: &PolicyArgs) -> Result<()> {
    storage.init(name, &policy.init_options(), false).await?;
    Ok(())
}

/// Parse a JSON argument string; empty means "no arguments".
pub fn parse_json_arguments(raw: Option<&str>) -> Result<serde_json::Value> {
    match raw.map(str::trim) {
        None | Some("") => Ok(serde_json::Value::Null),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| BiometricStorageError::BadArguments(format!("invalid JSON arguments: {e}"))),
    }
}
