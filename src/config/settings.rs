use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{BiometricStorageError, Result};
use crate::storage::BackendKind;

/// Host configuration, loaded from `biometric-storage.toml`.
///
/// Every field has a default so the storage works without any config
/// file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding store files and the key store.  Defaults to the
    /// platform data directory.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,

    /// Prefix for key aliases and credential accounts.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Backend to use; detected from the platform when absent.
    #[serde(default)]
    pub backend: Option<BackendKind>,

    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_namespace() -> String {
    "biometric_storage".to_string()
}

fn default_log_filter() -> String {
    "biometric_storage=info".to_string()
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_dir: None,
            namespace: default_namespace(),
            backend: None,
            log_filter: default_log_filter(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the config directory.
    pub const FILE_NAME: &'static str = "biometric-storage.toml";

    /// Load settings from `<config_dir>/biometric-storage.toml`.
    ///
    /// If the file does not exist, defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            BiometricStorageError::ConfigError(format!(
                "Failed to parse {}: {e}",
                config_path.display()
            ))
        })?;

        if settings.namespace.is_empty() {
            return Err(BiometricStorageError::ConfigError(
                "namespace cannot be empty".into(),
            ));
        }

        Ok(settings)
    }

    /// Platform config directory, e.g. `~/.config/biometric_storage`.
    pub fn default_config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "biometric_storage")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Directory store files are written to.
    pub fn storage_dir(&self) -> PathBuf {
        if let Some(dir) = &self.storage_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "biometric_storage")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".biometric_storage"))
    }

    /// Directory the file key store keeps its records in.
    pub fn keys_dir(&self) -> PathBuf {
        self.storage_dir().join("keys")
    }

    /// Configured backend, or the one matching this platform.
    pub fn backend(&self) -> BackendKind {
        self.backend.unwrap_or_else(BackendKind::detect)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.namespace, "biometric_storage");
        assert_eq!(s.log_filter, "biometric_storage=info");
        assert!(s.storage_dir.is_none());
        assert!(s.backend.is_none());
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.namespace, "biometric_storage");
    }

    #[test]
    fn load_parses_toml_file() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
storage_dir = "/var/lib/app/secure"
namespace = "design.codeux.authpass"
backend = "local"
log_filter = "biometric_storage=debug"
"#;
        fs::write(tmp.path().join(Settings::FILE_NAME), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.storage_dir(), PathBuf::from("/var/lib/app/secure"));
        assert_eq!(settings.keys_dir(), PathBuf::from("/var/lib/app/secure/keys"));
        assert_eq!(settings.namespace, "design.codeux.authpass");
        assert_eq!(settings.backend(), BackendKind::Local);
        assert_eq!(settings.log_filter, "biometric_storage=debug");
    }

    #[test]
    fn load_uses_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(Settings::FILE_NAME), "backend = \"authenticated\"\n").unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.backend(), BackendKind::Authenticated);
        assert_eq!(settings.namespace, "biometric_storage");
    }

    #[test]
    fn load_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(Settings::FILE_NAME), "not valid {{toml").unwrap();
        assert!(Settings::load(tmp.path()).is_err());
    }

    #[test]
    fn load_rejects_unknown_backend_and_empty_namespace() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(Settings::FILE_NAME), "backend = \"cloud\"\n").unwrap();
        assert!(Settings::load(tmp.path()).is_err());

        fs::write(tmp.path().join(Settings::FILE_NAME), "namespace = \"\"\n").unwrap();
        assert!(matches!(
            Settings::load(tmp.path()),
            Err(BiometricStorageError::ConfigError(_))
        ));
    }
}
