//! Integration tests for the authenticated storage path, driven through
//! the public façade with a scripted prompt and a manual clock.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use biometric_storage::auth::{
    AuthEvent, AuthMethod, ManualClock, PromptHost, PromptInfo, Script, ScriptedAuthenticator,
};
use biometric_storage::keystore::{FileKeyStore, KeyStore, MemoryKeyStore};
use biometric_storage::storage::AuthenticatedCipherBackend;
use biometric_storage::{
    AuthErrorKind, BiometricStorage, BiometricStorageError, InitOptions, StorageBackend,
};
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    authenticator: Arc<ScriptedAuthenticator>,
    clock: Arc<ManualClock>,
    backend: Arc<AuthenticatedCipherBackend>,
    storage: BiometricStorage,
}

/// Helper: storage over a fresh temp dir with an in-memory key store.
fn harness() -> Harness {
    let dir = TempDir::new().expect("create temp dir");
    harness_in(dir, Arc::new(MemoryKeyStore::new()))
}

fn harness_in(dir: TempDir, keystore: Arc<dyn KeyStore>) -> Harness {
    let authenticator = Arc::new(ScriptedAuthenticator::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ));
    let host = PromptHost::new();
    let backend = Arc::new(AuthenticatedCipherBackend::new(
        dir.path(),
        "biometric_storage",
        keystore,
        authenticator.clone(),
        clock.clone(),
        host.clone(),
    ));
    let storage = BiometricStorage::new(backend.clone(), host);
    Harness {
        dir,
        authenticator,
        clock,
        backend,
        storage,
    }
}

fn prompt() -> PromptInfo {
    PromptInfo::default()
}

fn auth_options(biometric_only: bool, validity: Option<i64>) -> InitOptions {
    InitOptions {
        authentication_required: true,
        android_biometric_only: biometric_only,
        darwin_biometric_only: biometric_only,
        authentication_validity_duration_seconds: validity,
    }
}

fn auth_kind(result: &biometric_storage::Result<impl std::fmt::Debug>) -> Option<AuthErrorKind> {
    match result {
        Err(BiometricStorageError::Auth { kind, .. }) => Some(*kind),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unauthenticated_round_trip_never_prompts() {
    let h = harness();
    h.storage
        .init("plain", &InitOptions::unauthenticated(), false)
        .await
        .unwrap();

    let long = "x".repeat(10_000);
    for value in ["", "hello", "ünïcødé ✓ 日本語", "line one\nline two", long.as_str()] {
        h.storage.write("plain", value, &prompt()).await.unwrap();
        let read = h.storage.read("plain", &prompt()).await.unwrap();
        assert_eq!(read.as_deref(), Some(value));
    }
    assert_eq!(h.authenticator.prompt_count(), 0);
}

#[tokio::test]
async fn validity_window_avoids_reprompting() {
    let h = harness();
    h.storage
        .init("windowed", &auth_options(false, Some(30)), false)
        .await
        .unwrap();

    h.storage.write("windowed", "v1", &prompt()).await.unwrap();
    for _ in 0..5 {
        h.storage.read("windowed", &prompt()).await.unwrap();
        h.storage.write("windowed", "v2", &prompt()).await.unwrap();
    }
    assert_eq!(h.authenticator.prompt_count(), 1);

    h.clock.advance(Duration::from_secs(30));
    let read = h.storage.read("windowed", &prompt()).await.unwrap();
    assert_eq!(read.as_deref(), Some("v2"));
    assert_eq!(h.authenticator.prompt_count(), 2);
}

#[tokio::test]
async fn per_operation_store_prompts_with_android_prompt_info() {
    let h = harness();
    h.storage
        .init("strict", &auth_options(true, None), false)
        .await
        .unwrap();

    let custom: PromptInfo = serde_json::from_value(serde_json::json!({
        "androidPromptInfo": { "title": "Unlock notes", "negativeButton": "Not now" }
    }))
    .unwrap();
    h.storage.write("strict", "secret", &custom).await.unwrap();
    h.storage.read("strict", &custom).await.unwrap();

    let requests = h.authenticator.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].title, "Unlock notes");
    assert_eq!(requests[0].negative_button, "Not now");
    assert!(!requests[0].allow_device_credential);
}

// ---------------------------------------------------------------------------
// Envelope properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_plaintext_encrypts_to_different_envelopes() {
    let h = harness();
    h.storage
        .init("nonce", &InitOptions::unauthenticated(), false)
        .await
        .unwrap();
    let path = h.backend.storage_file("nonce").unwrap().current_path();

    h.storage.write("nonce", "same", &prompt()).await.unwrap();
    let first = fs::read(&path).unwrap();
    h.storage.write("nonce", "same", &prompt()).await.unwrap();
    let second = fs::read(&path).unwrap();

    assert_ne!(first, second);
    assert_ne!(first[..12], second[..12]);

    fs::write(&path, &first).unwrap();
    assert_eq!(
        h.storage.read("nonce", &prompt()).await.unwrap().as_deref(),
        Some("same")
    );
    fs::write(&path, &second).unwrap();
    assert_eq!(
        h.storage.read("nonce", &prompt()).await.unwrap().as_deref(),
        Some("same")
    );
}

#[tokio::test]
async fn flipping_any_ciphertext_or_tag_bit_fails_integrity() {
    let h = harness();
    h.storage
        .init("tamper", &InitOptions::unauthenticated(), false)
        .await
        .unwrap();
    h.storage.write("tamper", "abc", &prompt()).await.unwrap();

    let path = h.backend.storage_file("tamper").unwrap().current_path();
    let original = fs::read(&path).unwrap();

    for index in 12..original.len() {
        for bit in 0..8 {
            let mut tampered = original.clone();
            tampered[index] ^= 1 << bit;
            fs::write(&path, &tampered).unwrap();

            let result = h.storage.read("tamper", &prompt()).await;
            assert!(
                matches!(result, Err(BiometricStorageError::Integrity)),
                "byte {index} bit {bit}: {result:?}"
            );
        }
    }

    fs::write(&path, &original).unwrap();
    assert_eq!(
        h.storage.read("tamper", &prompt()).await.unwrap().as_deref(),
        Some("abc")
    );
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_reports_whether_anything_was_removed() {
    let h = harness();
    h.storage
        .init("gone", &InitOptions::unauthenticated(), false)
        .await
        .unwrap();

    assert!(!h.storage.delete("gone", &prompt()).await.unwrap());

    h.storage.write("gone", "value", &prompt()).await.unwrap();
    assert!(h.storage.exists("gone").await.unwrap());
    assert!(h.storage.delete("gone", &prompt()).await.unwrap());
    assert!(!h.storage.exists("gone").await.unwrap());
}

#[tokio::test]
async fn canceled_prompt_leaves_data_unchanged() {
    let h = harness();
    h.storage
        .init("cancel", &auth_options(true, None), false)
        .await
        .unwrap();
    h.storage.write("cancel", "original", &prompt()).await.unwrap();
    let path = h.backend.storage_file("cancel").unwrap().current_path();
    let before = fs::read(&path).unwrap();

    h.authenticator.push(Script::cancel());
    let result = h.storage.write("cancel", "replacement", &prompt()).await;
    assert_eq!(auth_kind(&result), Some(AuthErrorKind::UserCanceled));
    assert!(result.unwrap_err().is_auth_cancellation());

    assert_eq!(fs::read(&path).unwrap(), before);
    assert_eq!(
        h.storage.read("cancel", &prompt()).await.unwrap().as_deref(),
        Some("original")
    );
}

#[tokio::test]
async fn not_recognized_is_not_a_failure() {
    let h = harness();
    h.storage
        .init("retry", &auth_options(true, None), false)
        .await
        .unwrap();

    h.authenticator.push(Script::Events(vec![
        AuthEvent::NotRecognized,
        AuthEvent::NotRecognized,
        AuthEvent::Succeeded(AuthMethod::Biometric),
    ]));
    h.storage.write("retry", "value", &prompt()).await.unwrap();
    assert_eq!(h.authenticator.prompt_count(), 1);
}

#[tokio::test]
async fn timeout_is_distinct_from_cancel_and_hardware_errors() {
    let h = harness();
    h.storage
        .init("errors", &auth_options(true, None), false)
        .await
        .unwrap();

    h.authenticator.push(Script::fail(AuthErrorKind::Timeout));
    let timeout = h.storage.write("errors", "v", &prompt()).await;
    assert_eq!(auth_kind(&timeout), Some(AuthErrorKind::Timeout));
    assert_eq!(timeout.unwrap_err().code(), "AuthError:Timeout");

    h.authenticator.push(Script::fail(AuthErrorKind::Unknown));
    let unknown = h.storage.write("errors", "v", &prompt()).await.unwrap_err();
    assert!(!unknown.is_auth_cancellation());
}

#[tokio::test]
async fn force_init_on_existing_store_fails() {
    let h = harness();
    let options = InitOptions::unauthenticated();

    assert!(h.storage.init("s", &options, false).await.unwrap());
    h.storage.write("s", "kept", &prompt()).await.unwrap();

    let forced = h.storage.init("s", &options, true).await;
    assert!(matches!(
        forced,
        Err(BiometricStorageError::AlreadyInitialized(_))
    ));
    assert!(!h.storage.init("s", &options, false).await.unwrap());
    assert_eq!(
        h.storage.read("s", &prompt()).await.unwrap().as_deref(),
        Some("kept")
    );
}

#[tokio::test]
async fn scenario_s1_unauthenticated_lifecycle() {
    let h = harness();
    assert!(h
        .storage
        .init("s1", &InitOptions::unauthenticated(), false)
        .await
        .unwrap());
    h.storage.write("s1", "hello", &prompt()).await.unwrap();
    assert_eq!(
        h.storage.read("s1", &prompt()).await.unwrap().as_deref(),
        Some("hello")
    );
    assert!(h.storage.delete("s1", &prompt()).await.unwrap());
    assert_eq!(h.storage.read("s1", &prompt()).await.unwrap(), None);
}

#[tokio::test]
async fn scenario_s2_rejects_indefinite_non_biometric_policy() {
    let h = harness();

    for validity in [None, Some(-1), Some(0)] {
        let result = h.storage.init("s2", &auth_options(false, validity), false).await;
        assert!(
            matches!(result, Err(BiometricStorageError::BadArguments(_))),
            "validity {validity:?}: {result:?}"
        );
    }

    assert!(h
        .storage
        .init("s2", &auth_options(false, Some(30)), false)
        .await
        .unwrap());
}

// ---------------------------------------------------------------------------
// Key invalidation and persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enrollment_change_surfaces_data_loss_then_recovers() {
    let h = harness();
    h.storage
        .init("bio", &auth_options(true, None), false)
        .await
        .unwrap();
    h.storage.write("bio", "before", &prompt()).await.unwrap();

    h.authenticator.set_enrollment(Some("enrollment-2"));
    let result = h.storage.read("bio", &prompt()).await;
    let err = result.unwrap_err();
    assert_eq!(err.code(), "KeyInvalidated");

    assert_eq!(h.storage.read("bio", &prompt()).await.unwrap(), None);
    h.storage.write("bio", "after", &prompt()).await.unwrap();
    assert_eq!(
        h.storage.read("bio", &prompt()).await.unwrap().as_deref(),
        Some("after")
    );
}

#[tokio::test]
async fn values_survive_a_restart_with_file_key_store() {
    let dir = TempDir::new().unwrap();
    let keys = dir.path().join("keys");

    let h = harness_in(dir, Arc::new(FileKeyStore::new(&keys)));
    h.storage
        .init("persist", &auth_options(false, Some(60)), false)
        .await
        .unwrap();
    h.storage.write("persist", "durable", &prompt()).await.unwrap();

    let Harness { dir, .. } = h;
    let restarted = harness_in(dir, Arc::new(FileKeyStore::new(&keys)));
    restarted
        .storage
        .init("persist", &auth_options(false, Some(60)), false)
        .await
        .unwrap();
    assert_eq!(
        restarted
            .storage
            .read("persist", &prompt())
            .await
            .unwrap()
            .as_deref(),
        Some("durable")
    );
    assert_eq!(restarted.authenticator.prompt_count(), 1);
    assert!(restarted.dir.path().join("persist.v2.bin").exists());
}

#[tokio::test]
async fn changing_policy_over_an_existing_key_is_refused() {
    let dir = TempDir::new().unwrap();
    let keys = dir.path().join("keys");

    let h = harness_in(dir, Arc::new(FileKeyStore::new(&keys)));
    h.storage
        .init("pin", &auth_options(true, None), false)
        .await
        .unwrap();
    h.storage.write("pin", "1234", &prompt()).await.unwrap();

    let Harness { dir, .. } = h;
    let restarted = harness_in(dir, Arc::new(FileKeyStore::new(&keys)));
    let err = restarted
        .storage
        .init("pin", &auth_options(true, Some(30)), false)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "KeyStoreError");
    assert!(!err.is_auth_cancellation());
    assert!(matches!(
        restarted.storage.read("pin", &prompt()).await,
        Err(BiometricStorageError::NotInitialized(_))
    ));
    assert_eq!(restarted.authenticator.prompt_count(), 0);

    // The original policy still opens the store, and deleting it frees the
    // name for a new policy.
    restarted
        .storage
        .init("pin", &auth_options(true, None), false)
        .await
        .unwrap();
    assert_eq!(
        restarted.storage.read("pin", &prompt()).await.unwrap().as_deref(),
        Some("1234")
    );
    assert!(restarted.storage.delete("pin", &prompt()).await.unwrap());
    assert!(restarted.storage.dispose("pin").await.unwrap());

    restarted
        .storage
        .init("pin", &auth_options(true, Some(30)), false)
        .await
        .unwrap();
    restarted.storage.write("pin", "5678", &prompt()).await.unwrap();
    assert_eq!(
        restarted.storage.read("pin", &prompt()).await.unwrap().as_deref(),
        Some("5678")
    );
}

#[tokio::test]
async fn validity_window_beyond_the_key_store_limit_is_rejected() {
    let h = harness();
    let err = h
        .storage
        .init("forever", &auth_options(true, Some(100_000_000_000_000)), false)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "BadArguments");
    assert!(matches!(
        h.storage.write("forever", "value", &prompt()).await,
        Err(BiometricStorageError::NotInitialized(_))
    ));

    h.storage
        .init("long", &auth_options(true, Some(i64::from(i32::MAX))), false)
        .await
        .unwrap();
    h.storage.write("long", "value", &prompt()).await.unwrap();
    assert_eq!(
        h.storage.read("long", &prompt()).await.unwrap().as_deref(),
        Some("value")
    );
    assert_eq!(h.authenticator.prompt_count(), 1);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_reads_share_one_prompt() {
    let h = harness();
    h.storage
        .init("shared", &auth_options(true, Some(60)), false)
        .await
        .unwrap();
    h.storage.write("shared", "v", &prompt()).await.unwrap();
    h.clock.advance(Duration::from_secs(60));

    h.authenticator.push(Script::Delayed(
        Duration::from_millis(50),
        vec![AuthEvent::Succeeded(AuthMethod::Biometric)],
    ));
    let (prompt_a, prompt_b) = (prompt(), prompt());
    let (a, b) = tokio::join!(
        h.storage.read("shared", &prompt_a),
        h.storage.read("shared", &prompt_b)
    );

    assert_eq!(a.unwrap().as_deref(), Some("v"));
    assert_eq!(b.unwrap().as_deref(), Some("v"));
    assert_eq!(h.authenticator.prompt_count(), 2);
    assert_eq!(h.authenticator.max_concurrent_prompts(), 1);
}

#[tokio::test]
async fn prompts_for_different_stores_never_overlap() {
    let h = harness();
    for name in ["one", "two", "three"] {
        h.storage
            .init(name, &auth_options(true, None), false)
            .await
            .unwrap();
        h.authenticator.push(Script::Delayed(
            Duration::from_millis(20),
            vec![AuthEvent::Succeeded(AuthMethod::Biometric)],
        ));
    }

    let (prompt_one, prompt_two, prompt_three) = (prompt(), prompt(), prompt());
    let (one, two, three) = tokio::join!(
        h.storage.write("one", "1", &prompt_one),
        h.storage.write("two", "2", &prompt_two),
        h.storage.write("three", "3", &prompt_three)
    );
    one.unwrap();
    two.unwrap();
    three.unwrap();

    assert_eq!(h.authenticator.prompt_count(), 3);
    assert_eq!(h.authenticator.max_concurrent_prompts(), 1);
    assert_eq!(
        h.storage.read("two", &prompt()).await.unwrap().as_deref(),
        Some("2")
    );
}

#[tokio::test]
async fn detaching_the_ui_cancels_a_pending_prompt() {
    let h = harness();
    h.storage
        .init("detach", &auth_options(true, None), false)
        .await
        .unwrap();
    h.authenticator.push(Script::Hang);

    let host = h.storage.prompt_host().clone();
    let detacher = async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        host.detach();
    };
    let detach_prompt = prompt();
    let (result, ()) = tokio::join!(h.storage.write("detach", "v", &detach_prompt), detacher);

    assert_eq!(auth_kind(&result), Some(AuthErrorKind::Canceled));
    assert!(h.authenticator.was_canceled());
    assert!(!h.storage.exists("detach").await.unwrap());

    // A late answer from the platform goes nowhere.
    h.authenticator
        .release_hung(AuthEvent::Succeeded(AuthMethod::Biometric));
    assert!(!h.storage.exists("detach").await.unwrap());
}

#[tokio::test]
async fn backend_can_be_used_through_the_trait_object() {
    let h = harness();
    let backend: Arc<dyn StorageBackend> = h.backend.clone();
    backend
        .init("dyn", &InitOptions::unauthenticated(), false)
        .await
        .unwrap();
    backend.write("dyn", "via trait", &prompt()).await.unwrap();
    assert_eq!(
        h.storage.read("dyn", &prompt()).await.unwrap().as_deref(),
        Some("via trait")
    );
}
