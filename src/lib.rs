pub mod auth;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod errors;
pub mod keystore;
pub mod logging;
pub mod policy;
pub mod registry;
pub mod storage;

pub use dispatch::{BiometricStorage, MethodCall, MethodError, MethodResponse};
pub use errors::{AuthErrorKind, BiometricStorageError, Result};
pub use policy::StorePolicy;
pub use storage::{BackendKind, InitOptions, StorageBackend};
