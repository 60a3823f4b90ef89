//! `biometric-storage write`: replace a store's value.

use std::io::{self, IsTerminal, Read};

use zeroize::Zeroizing;

use crate::auth::PromptInfo;
use crate::cli::{init_store, output, PolicyArgs};
use crate::dispatch::BiometricStorage;
use crate::errors::{BiometricStorageError, Result};

/// Execute the `write` command.
pub async fn execute(
    storage: &BiometricStorage,
    name: &str,
    content: Option<&str>,
    policy: &PolicyArgs,
) -> Result<()> {
    // Determine the value from one of three sources.
    let value = if let Some(v) = content {
        // Source 1: Inline value on the command line.
        output::warning("Value provided on command line: it may appear in shell history.");
        Zeroizing::new(v.to_string())
    } else if !io::stdin().is_terminal() {
        // Source 2: Piped input (stdin is not a terminal).
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim_end_matches(['\r', '\n']).len();
        buf.truncate(trimmed);
        buf
    } else {
        // Source 3: Interactive hidden prompt.
        let v = dialoguer::Password::new()
            .with_prompt(format!("Enter value for '{name}'"))
            .allow_empty_password(true)
            .interact()
            .map_err(|e| BiometricStorageError::CommandFailed(format!("input prompt: {e}")))?;
        Zeroizing::new(v)
    };

    init_store(storage, name, policy).await?;
    storage.write(name, &value, &PromptInfo::default()).await?;

    output::success(&format!("Stored value in '{name}'"));
    Ok(())
}
