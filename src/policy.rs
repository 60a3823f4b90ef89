//! Store authentication policy.
//!
//! A policy is fixed when a store's key is generated.  Changing it means
//! deleting the key (and with it the data) and starting over.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{BiometricStorageError, Result};

/// Longest accepted validity window, matching the platform keystore's
/// 32-bit seconds parameter.
pub const MAX_VALIDITY_SECS: u64 = i32::MAX as u64;

/// How a store's key may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorePolicy {
    /// Whether reading or writing requires the user to authenticate.
    pub authentication_required: bool,

    /// Disallow device-credential (PIN, pattern, password) fallback.
    pub biometric_only: bool,

    /// Seconds an authentication stays usable.  `None` means every
    /// operation prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity_secs: Option<u64>,
}

impl StorePolicy {
    /// A store anyone on the device can read without prompting.
    pub const fn unauthenticated() -> Self {
        Self {
            authentication_required: false,
            biometric_only: false,
            validity_secs: None,
        }
    }

    /// Build a policy from the raw init options.  A duration that is
    /// absent, zero or negative means "prompt every operation".
    pub fn from_options(
        authentication_required: bool,
        biometric_only: bool,
        validity_duration_seconds: Option<i64>,
    ) -> Self {
        let validity_secs = validity_duration_seconds
            .filter(|secs| *secs > 0)
            .map(|secs| secs.unsigned_abs());
        Self {
            authentication_required,
            biometric_only,
            validity_secs,
        }
    }

    pub fn validity(&self) -> Option<Duration> {
        self.validity_secs.map(Duration::from_secs)
    }

    /// The validity window as a calendar offset.
    pub(crate) fn validity_delta(&self) -> Result<Option<chrono::Duration>> {
        self.validity_secs
            .map(|secs| {
                i64::try_from(secs)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                    .ok_or_else(|| {
                        BiometricStorageError::KeyStore(format!(
                            "validity of {secs}s cannot be represented"
                        ))
                    })
            })
            .transpose()
    }

    /// `true` when a key generated under `key_policy` enforces exactly this
    /// policy.  Unauthenticated policies ignore the remaining fields.
    pub fn matches_key(&self, key_policy: &StorePolicy) -> bool {
        if !self.authentication_required && !key_policy.authentication_required {
            return true;
        }
        self == key_policy
    }

    /// `true` when every cipher operation needs its own authentication.
    pub fn is_per_operation(&self) -> bool {
        self.authentication_required && self.validity_secs.is_none()
    }

    /// Whether a successful authentication may be reused by later calls.
    pub fn allows_reuse(&self) -> bool {
        self.authentication_required && self.validity_secs.is_some()
    }

    /// Legacy files predate per-operation keys; under such a policy they
    /// are never accepted.
    pub fn permits_legacy(&self) -> bool {
        !self.is_per_operation()
    }

    /// Reject combinations the key store cannot honour.
    ///
    /// A key usable indefinitely after a single device-credential
    /// authentication would bypass the biometric guarantee, so
    /// per-operation keys must be biometric-only.
    pub fn validate(&self) -> Result<()> {
        if self.is_per_operation() && !self.biometric_only {
            return Err(BiometricStorageError::BadArguments(
                "authentication without a validity duration requires biometricOnly=true".into(),
            ));
        }
        if let Some(secs) = self.validity_secs {
            if secs > MAX_VALIDITY_SECS {
                return Err(BiometricStorageError::BadArguments(format!(
                    "authenticationValidityDurationSeconds must not exceed {MAX_VALIDITY_SECS}, got {secs}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self::unauthenticated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_duration_means_per_operation() {
        for raw in [None, Some(0), Some(-1)] {
            let policy = StorePolicy::from_options(true, true, raw);
            assert_eq!(policy.validity(), None);
            assert!(policy.is_per_operation());
            assert!(!policy.allows_reuse());
        }
    }

    #[test]
    fn positive_duration_allows_reuse() {
        let policy = StorePolicy::from_options(true, false, Some(30));
        assert_eq!(policy.validity(), Some(Duration::from_secs(30)));
        assert!(policy.allows_reuse());
        assert!(policy.permits_legacy());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn per_operation_without_biometric_only_is_rejected() {
        let policy = StorePolicy::from_options(true, false, Some(-1));
        assert!(matches!(
            policy.validate(),
            Err(BiometricStorageError::BadArguments(_))
        ));

        let policy = StorePolicy::from_options(true, true, None);
        assert!(policy.validate().is_ok());
        assert!(!policy.permits_legacy());
    }

    #[test]
    fn oversized_validity_is_rejected() {
        let policy = StorePolicy::from_options(true, true, Some(100_000_000_000_000));
        assert!(matches!(
            policy.validate(),
            Err(BiometricStorageError::BadArguments(_))
        ));

        let longest = StorePolicy::from_options(true, false, Some(i64::from(i32::MAX)));
        assert!(longest.validate().is_ok());
        assert!(longest.validity_delta().unwrap().is_some());
    }

    #[test]
    fn unauthenticated_policies_match_regardless_of_flags() {
        let plain = StorePolicy::from_options(false, true, Some(30));
        assert!(plain.matches_key(&StorePolicy::unauthenticated()));

        let windowed = StorePolicy::from_options(true, true, Some(30));
        let per_operation = StorePolicy::from_options(true, true, None);
        assert!(!windowed.matches_key(&per_operation));
        assert!(windowed.matches_key(&windowed));
    }

    #[test]
    fn unauthenticated_policy_is_always_valid() {
        let policy = StorePolicy::from_options(false, false, None);
        assert!(policy.validate().is_ok());
        assert!(!policy.is_per_operation());
        assert!(policy.permits_legacy());
    }
}
