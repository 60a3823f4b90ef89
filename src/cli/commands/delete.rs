//! `biometric-storage delete`: remove a store's value and key.

use dialoguer::Confirm;

use crate::auth::PromptInfo;
use crate::cli::{init_store, output, PolicyArgs};
use crate::dispatch::BiometricStorage;
use crate::errors::{BiometricStorageError, Result};

/// Execute the `delete` command.
pub async fn execute(
    storage: &BiometricStorage,
    name: &str,
    force: bool,
    policy: &PolicyArgs,
) -> Result<()> {
    // Unless --force is set, ask for confirmation before deleting.
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete store '{name}'? Its value cannot be recovered."))
            .default(false)
            .interact()
            .map_err(|e| BiometricStorageError::CommandFailed(format!("confirm prompt: {e}")))?;

        if !confirmed {
            output::info("Cancelled.");
            return Ok(());
        }
    }

    init_store(storage, name, policy).await?;
    if storage.delete(name, &PromptInfo::default()).await? {
        output::success(&format!("Deleted store '{name}'"));
    } else {
        output::info(&format!("Store '{name}' held nothing to delete."));
    }
    Ok(())
}
