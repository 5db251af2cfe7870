//! Integration tests for the session lifecycle manager

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;
use zappies_core::backend::BackendClient;
use zappies_core::error::ZappiesError;
use zappies_core::memory::MemoryBackend;
use zappies_core::models::{ProfilePatch, ProfileSeed, Session, UserProfile};
use zappies_core::session::{AuthPhase, SessionManager};
use zappies_core::store::{FlagStore, MemoryFlagStore, HAS_SEEN_ONBOARDING};

const EMAIL: &str = "owner@example.com";
const PASSWORD: &str = "Secret123";

fn profile_for(user_id: Uuid) -> UserProfile {
    let now = Utc::now();
    UserProfile {
        id: user_id,
        email: EMAIL.to_string(),
        full_name: "Test Owner".to_string(),
        phone: String::new(),
        business_name: "Acme".to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn session_for(user_id: Uuid) -> Session {
    Session {
        user_id,
        email: EMAIL.to_string(),
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
        expires_at: Utc::now() + chrono::Duration::hours(1),
    }
}

fn seed() -> ProfileSeed {
    ProfileSeed {
        full_name: "Test Owner".to_string(),
        phone: String::new(),
        business_name: "Acme".to_string(),
    }
}

fn manager_with(backend: Arc<MemoryBackend>, flags: Arc<MemoryFlagStore>) -> SessionManager {
    SessionManager::new(backend, flags)
}

#[tokio::test]
async fn test_init_without_flag_is_first_time() {
    let backend = Arc::new(MemoryBackend::new());
    let manager = manager_with(backend, Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();

    let state = manager.current();
    assert_eq!(state.phase, AuthPhase::Unauthenticated);
    assert!(state.first_time);
    assert!(state.session.is_none());
}

#[tokio::test]
async fn test_init_with_flag_set_is_not_first_time() {
    let backend = Arc::new(MemoryBackend::new());
    let flags = Arc::new(MemoryFlagStore::new());
    flags.set(HAS_SEEN_ONBOARDING, "true").unwrap();

    let manager = manager_with(backend, flags);
    manager.init().await.unwrap();
    assert!(!manager.current().first_time);
}

#[tokio::test]
async fn test_init_flag_read_failure_assumes_onboarding_done() {
    let backend = Arc::new(MemoryBackend::new());
    let flags = Arc::new(MemoryFlagStore::new());
    flags.fail_reads();

    let manager = manager_with(backend, flags);
    manager.init().await.unwrap();
    assert!(!manager.current().first_time);
}

#[tokio::test]
async fn test_init_restores_persisted_session_and_profile() {
    let backend = Arc::new(MemoryBackend::new());
    let user_id = backend.register_account(EMAIL, PASSWORD);
    backend.set_session(session_for(user_id));
    backend.insert_profile(profile_for(user_id));

    let manager = manager_with(backend, Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();

    let state = manager.current();
    assert_eq!(state.phase, AuthPhase::Authenticated);
    assert_eq!(state.user_id(), Some(user_id));
    assert_eq!(state.profile.unwrap().id, user_id);
}

#[tokio::test]
async fn test_sign_in_success_loads_profile() {
    let backend = Arc::new(MemoryBackend::new());
    let user_id = backend.register_account(EMAIL, PASSWORD);
    backend.insert_profile(profile_for(user_id));

    let manager = manager_with(backend, Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();
    let session = manager.sign_in(EMAIL, PASSWORD).await.unwrap();

    assert_eq!(session.user_id, user_id);
    let state = manager.current();
    assert_eq!(state.phase, AuthPhase::Authenticated);
    assert_eq!(state.profile.unwrap().email, EMAIL);
    assert!(state.last_error.is_none());
}

#[tokio::test]
async fn test_sign_in_missing_profile_is_not_an_error() {
    let backend = Arc::new(MemoryBackend::new());
    backend.register_account(EMAIL, PASSWORD);

    let manager = manager_with(backend, Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();
    manager.sign_in(EMAIL, PASSWORD).await.unwrap();

    let state = manager.current();
    assert_eq!(state.phase, AuthPhase::Authenticated);
    assert!(state.profile.is_none());
    assert!(state.last_error.is_none());
}

#[tokio::test]
async fn test_sign_in_bad_credentials_sets_error_and_stays_signed_out() {
    let backend = Arc::new(MemoryBackend::new());
    backend.register_account(EMAIL, PASSWORD);

    let manager = manager_with(backend, Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();
    let result = manager.sign_in(EMAIL, "WrongPass1").await;

    assert!(result.is_err());
    let state = manager.current();
    assert_eq!(state.phase, AuthPhase::Unauthenticated);
    assert!(state.session.is_none());
    assert!(state.last_error.is_some());
}

#[tokio::test]
async fn test_sign_up_creates_profile_row() {
    let backend = Arc::new(MemoryBackend::new());
    let manager = manager_with(backend.clone(), Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();

    let outcome = manager.sign_up(EMAIL, PASSWORD, &seed()).await.unwrap();
    let user_id = outcome.user_id.unwrap();

    let profile = backend.get_user_profile(user_id).await.unwrap().unwrap();
    assert_eq!(profile.email, EMAIL);
    assert_eq!(profile.full_name, "Test Owner");
    // No session until the email is confirmed.
    assert!(outcome.session.is_none());
    assert_eq!(manager.current().phase, AuthPhase::Unauthenticated);
}

#[tokio::test]
async fn test_sign_up_succeeds_even_when_profile_creation_fails() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_profile_creation();

    let manager = manager_with(backend.clone(), Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();

    let outcome = manager.sign_up(EMAIL, PASSWORD, &seed()).await.unwrap();
    let user_id = outcome.user_id.unwrap();
    assert!(backend.get_user_profile(user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sign_up_rejects_duplicate_email() {
    let backend = Arc::new(MemoryBackend::new());
    backend.register_account(EMAIL, PASSWORD);

    let manager = manager_with(backend, Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();

    let result = manager.sign_up(EMAIL, PASSWORD, &seed()).await;
    assert!(result.is_err());
    assert!(manager.current().last_error.is_some());
}

#[tokio::test]
async fn test_sign_up_rejects_weak_password() {
    let backend = Arc::new(MemoryBackend::new());
    let manager = manager_with(backend, Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();

    assert!(manager.sign_up(EMAIL, "short", &seed()).await.is_err());
}

#[tokio::test]
async fn test_sign_out_clears_state() {
    let backend = Arc::new(MemoryBackend::new());
    let user_id = backend.register_account(EMAIL, PASSWORD);
    backend.insert_profile(profile_for(user_id));

    let manager = manager_with(backend, Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();
    manager.sign_in(EMAIL, PASSWORD).await.unwrap();
    manager.sign_out().await.unwrap();

    let state = manager.current();
    assert_eq!(state.phase, AuthPhase::Unauthenticated);
    assert!(state.session.is_none());
    assert!(state.profile.is_none());
}

#[tokio::test]
async fn test_sign_out_clears_state_even_when_backend_fails() {
    let backend = Arc::new(MemoryBackend::new());
    let user_id = backend.register_account(EMAIL, PASSWORD);
    backend.insert_profile(profile_for(user_id));

    let manager = manager_with(backend.clone(), Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();
    manager.sign_in(EMAIL, PASSWORD).await.unwrap();

    backend.fail_next_sign_out();
    let result = manager.sign_out().await;

    assert!(result.is_err());
    let state = manager.current();
    assert_eq!(state.phase, AuthPhase::Unauthenticated);
    assert!(state.session.is_none());
    assert!(state.profile.is_none());
}

#[tokio::test]
async fn test_update_profile_without_session_fails_fast() {
    let backend = Arc::new(MemoryBackend::new());
    let manager = manager_with(backend, Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();

    let patch = ProfilePatch { full_name: Some("New Name".to_string()), ..Default::default() };
    let result = manager.update_profile(&patch).await;
    assert!(matches!(result, Err(ZappiesError::NoActiveSession)));
}

#[tokio::test]
async fn test_update_profile_merges_optimistically() {
    let backend = Arc::new(MemoryBackend::new());
    let user_id = backend.register_account(EMAIL, PASSWORD);
    backend.insert_profile(profile_for(user_id));

    let manager = manager_with(backend.clone(), Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();
    manager.sign_in(EMAIL, PASSWORD).await.unwrap();

    let patch = ProfilePatch { full_name: Some("New Name".to_string()), ..Default::default() };
    let merged = manager.update_profile(&patch).await.unwrap().unwrap();

    assert_eq!(merged.full_name, "New Name");
    // Untouched fields survive the merge.
    assert_eq!(merged.business_name, "Acme");
    assert_eq!(manager.current().profile.unwrap().full_name, "New Name");

    let stored = backend.get_user_profile(user_id).await.unwrap().unwrap();
    assert_eq!(stored.full_name, "New Name");
}

#[tokio::test]
async fn test_complete_onboarding_persists_across_managers() {
    let backend = Arc::new(MemoryBackend::new());
    let flags = Arc::new(MemoryFlagStore::new());

    let manager = manager_with(backend.clone(), flags.clone());
    manager.init().await.unwrap();
    assert!(manager.current().first_time);

    manager.complete_onboarding().unwrap();
    assert!(!manager.current().first_time);
    // Idempotent.
    manager.complete_onboarding().unwrap();

    let second = manager_with(backend, flags);
    second.init().await.unwrap();
    assert!(!second.current().first_time);
}

#[tokio::test]
async fn test_reset_password_reaches_backend() {
    let backend = Arc::new(MemoryBackend::new());
    let manager = manager_with(backend.clone(), Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();

    manager.reset_password(EMAIL).await.unwrap();
    assert_eq!(backend.reset_requests(), vec![EMAIL.to_string()]);
}

#[tokio::test]
async fn test_listener_applies_externally_emitted_sign_out() {
    let backend = Arc::new(MemoryBackend::new());
    let user_id = backend.register_account(EMAIL, PASSWORD);
    backend.insert_profile(profile_for(user_id));

    let manager = manager_with(backend.clone(), Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();
    manager.sign_in(EMAIL, PASSWORD).await.unwrap();

    // Sign out on the backend directly, as another device would.
    backend.sign_out().await.unwrap();

    let mut receiver = manager.subscribe();
    tokio::time::timeout(
        Duration::from_secs(2),
        receiver.wait_for(|state| state.session.is_none()),
    )
    .await
    .expect("listener did not observe the sign-out")
    .unwrap();

    let state = manager.current();
    assert_eq!(state.phase, AuthPhase::Unauthenticated);
    assert!(state.profile.is_none());
}

#[tokio::test]
async fn test_auth_events_apply_in_emission_order() {
    let backend = Arc::new(MemoryBackend::new());
    let user_id = backend.register_account(EMAIL, PASSWORD);
    backend.insert_profile(profile_for(user_id));

    let manager = manager_with(backend.clone(), Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();
    manager.sign_in(EMAIL, PASSWORD).await.unwrap();

    // The stream now carries the sign-in event followed by the refresh;
    // the held session must settle on the refreshed token, never on the
    // earlier one.
    let refreshed = backend.refresh_session().await.unwrap();

    let mut receiver = manager.subscribe();
    tokio::time::timeout(
        Duration::from_secs(2),
        receiver.wait_for(|state| {
            state
                .session
                .as_ref()
                .is_some_and(|session| session.access_token == refreshed.access_token)
        }),
    )
    .await
    .expect("held session never settled on the refreshed token")
    .unwrap();

    let state = manager.current();
    assert_eq!(state.phase, AuthPhase::Authenticated);
    assert_eq!(state.user_id(), Some(user_id));
    assert_eq!(state.session.unwrap().access_token, refreshed.access_token);
}

#[tokio::test]
async fn test_dispose_stops_listener() {
    let backend = Arc::new(MemoryBackend::new());
    let user_id = backend.register_account(EMAIL, PASSWORD);
    backend.insert_profile(profile_for(user_id));

    let manager = manager_with(backend.clone(), Arc::new(MemoryFlagStore::new()));
    manager.init().await.unwrap();
    manager.sign_in(EMAIL, PASSWORD).await.unwrap();
    manager.dispose();

    // Events emitted after dispose no longer mutate state.
    backend.sign_out().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.current().phase, AuthPhase::Authenticated);
}
