//! `biometric-storage can-authenticate`: probe the prompt without showing it.

use crate::auth::CanAuthenticate;
use crate::cli::output;
use crate::dispatch::BiometricStorage;
use crate::errors::Result;

/// Execute the `can-authenticate` command.
pub fn execute(storage: &BiometricStorage) -> Result<()> {
    let status = storage.can_authenticate();
    println!("{}", status.as_str());

    if status != CanAuthenticate::Success {
        output::tip("Only stores without --auth-required can be used on this host.");
    }
    Ok(())
}
