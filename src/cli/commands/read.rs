//! `biometric-storage read`: print a store's value.

use crate::auth::PromptInfo;
use crate::cli::{init_store, output, PolicyArgs};
use crate::dispatch::BiometricStorage;
use crate::errors::Result;

/// Execute the `read` command.
pub async fn execute(storage: &BiometricStorage, name: &str, policy: &PolicyArgs) -> Result<()> {
    init_store(storage, name, policy).await?;

    match storage.read(name, &PromptInfo::default()).await? {
        Some(value) => println!("{value}"),
        None => output::info(&format!("Store '{name}' holds no value.")),
    }
    Ok(())
}
