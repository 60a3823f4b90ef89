//! `biometric-storage call`: drive the dispatch façade with raw method calls.
//!
//! With a method argument, one call is made.  Without one, every stdin
//! line is parsed as `{"method": ..., "arguments": ...}` and the calls run
//! in order against the same process, so a script can `init` a store and
//! then use it.

use std::io::{self, BufRead};

use crate::cli::{output, parse_json_arguments};
use crate::dispatch::{BiometricStorage, MethodCall, MethodError, MethodResponse};
use crate::errors::{BiometricStorageError, Result};

/// Execute the `call` command.  Fails if any call did not succeed.
pub async fn execute(
    storage: &BiometricStorage,
    method: Option<&str>,
    arguments: Option<&str>,
) -> Result<()> {
    let mut failed = 0usize;

    if let Some(method) = method {
        let call = MethodCall::new(method, parse_json_arguments(arguments)?);
        failed += run(storage, call).await;
    } else {
        for line in io::stdin().lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MethodCall>(&line) {
                Ok(call) => failed += run(storage, call).await,
                Err(e) => {
                    output::response(&MethodResponse::Error(MethodError {
                        code: "BadArguments".into(),
                        message: format!("invalid method call: {e}"),
                        details: None,
                    }));
                    failed += 1;
                }
            }
        }
    }

    if failed > 0 {
        return Err(BiometricStorageError::CommandFailed(format!(
            "{failed} call(s) did not succeed"
        )));
    }
    Ok(())
}

async fn run(storage: &BiometricStorage, call: MethodCall) -> usize {
    let response = storage.handle(call).await;
    output::response(&response);
    usize::from(!response.is_success())
}
