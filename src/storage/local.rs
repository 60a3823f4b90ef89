//! Backend that keeps values as plain files.
//!
//! Used where no secure storage exists (the browser's local storage is
//! the model).  It never authenticates, so only non-authenticated stores
//! can be initialized.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{
    remove_if_present, run_blocking, validate_store_name, write_atomically, BackendKind,
    InitOptions, StorageBackend,
};
use crate::auth::{CanAuthenticate, PromptInfo};
use crate::errors::{BiometricStorageError, Result};
use crate::registry::StorageRegistry;

const LOCAL_SUFFIX: &str = ".local";

pub struct LocalBackend {
    dir: PathBuf,
    stores: StorageRegistry<PathBuf>,
}

impl LocalBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stores: StorageRegistry::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn value_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}{LOCAL_SUFFIX}"))
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn can_authenticate(&self) -> CanAuthenticate {
        CanAuthenticate::Unsupported
    }

    async fn init(&self, name: &str, options: &InitOptions, force_init: bool) -> Result<bool> {
        validate_store_name(name)?;
        if options.authentication_required {
            return Err(BiometricStorageError::BadArguments(
                "local storage only supports non-authenticated stores".into(),
            ));
        }

        let created = self.stores.insert_with(name, || Ok(self.value_path(name)))?;
        if !created && force_init {
            return Err(BiometricStorageError::AlreadyInitialized(name.to_string()));
        }
        if created {
            warn!(store = %name, "local backend stores values unencrypted");
        }
        Ok(created)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.stores.get(name)?;
        run_blocking(move || Ok(path.is_file())).await
    }

    async fn read(&self, name: &str, _prompt: &PromptInfo) -> Result<Option<String>> {
        let path = self.stores.get(name)?;
        run_blocking(move || match fs::read_to_string(&*path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BiometricStorageError::File {
                path: path.to_path_buf(),
                source,
            }),
        })
        .await
    }

    async fn write(&self, name: &str, content: &str, _prompt: &PromptInfo) -> Result<()> {
        let path = self.stores.get(name)?;
        let content = content.to_string();
        run_blocking(move || write_atomically(&path, content.as_bytes())).await?;
        debug!(store = %name, "wrote local value");
        Ok(())
    }

    async fn delete(&self, name: &str, _prompt: &PromptInfo) -> Result<bool> {
        let path = self.stores.get(name)?;
        run_blocking(move || {
            remove_if_present(&path).map_err(|source| BiometricStorageError::File {
                path: path.to_path_buf(),
                source,
            })
        })
        .await
    }

    async fn dispose(&self, name: &str) -> Result<bool> {
        Ok(self.stores.remove(name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn authenticated_stores_are_rejected() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path());
        let result = backend.init("notes", &InitOptions::default(), false).await;
        assert!(matches!(result, Err(BiometricStorageError::BadArguments(_))));
    }

    #[tokio::test]
    async fn values_round_trip_through_plain_files() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path());
        let prompt = PromptInfo::default();
        assert!(backend.init("notes", &InitOptions::unauthenticated(), false).await.unwrap());

        assert_eq!(backend.read("notes", &prompt).await.unwrap(), None);
        backend.write("notes", "plain", &prompt).await.unwrap();
        assert_eq!(
            fs::read_to_string(backend.value_path("notes")).unwrap(),
            "plain"
        );
        assert!(backend.delete("notes", &prompt).await.unwrap());
        assert!(!backend.exists("notes").await.unwrap());
    }
}
