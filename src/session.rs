//! Session lifecycle management
//!
//! [`SessionManager`] owns the authentication state machine: it restores
//! the persisted session at startup, reacts to the backend's auth-change
//! stream, and exposes the sign-in/sign-up/sign-out operations. State is
//! published through a `watch` channel so UI layers subscribe instead of
//! reaching into shared globals. The manager is the only writer of its
//! state; the auth-change stream is consumed by a single spawned task so
//! events are handled strictly in emission order.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::BackendClient;
use crate::error::{Result, ZappiesError};
use crate::metrics::METRIC_AUTH_EVENTS_TOTAL;
use crate::models::{ProfilePatch, ProfileSeed, Session, SignUpOutcome, UserProfile};
use crate::store::{FlagStore, HAS_SEEN_ONBOARDING};

/// Deep link the password-reset email returns to.
const RESET_REDIRECT: &str = "com.zappiesai.mobile://reset-password";

/// Coarse authentication phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// Startup: flag read and session restore still in flight
    Initializing,
    /// No session held
    Unauthenticated,
    /// A sign-in or sign-up call is in flight
    Authenticating,
    /// A session is held
    Authenticated,
}

/// The manager's published state. Cloned out of the watch channel by
/// subscribers; never mutated by anyone but the manager.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Current phase
    pub phase: AuthPhase,
    /// Held session, present exactly in `Authenticated`
    pub session: Option<Session>,
    /// Held profile; `None` means "incomplete profile", not a fault
    pub profile: Option<UserProfile>,
    /// True until onboarding has been completed on this device
    pub first_time: bool,
    /// Message of the last failed operation, for surfacing in the UI
    pub last_error: Option<String>,
}

impl SessionState {
    fn initial() -> Self {
        Self {
            phase: AuthPhase::Initializing,
            session: None,
            profile: None,
            first_time: false,
            last_error: None,
        }
    }

    /// Id of the signed-in user, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|session| session.user_id)
    }

    fn stable_phase(&self) -> AuthPhase {
        if self.session.is_some() {
            AuthPhase::Authenticated
        } else {
            AuthPhase::Unauthenticated
        }
    }
}

/// Owns the authentication state machine and the auth-change listener.
pub struct SessionManager {
    backend: Arc<dyn BackendClient>,
    flags: Arc<dyn FlagStore>,
    state: Arc<watch::Sender<SessionState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Construct an uninitialized manager. Call [`SessionManager::init`]
    /// before reading state.
    #[must_use]
    pub fn new(backend: Arc<dyn BackendClient>, flags: Arc<dyn FlagStore>) -> Self {
        let (sender, _receiver) = watch::channel(SessionState::initial());
        Self { backend, flags, state: Arc::new(sender), listener: Mutex::new(None) }
    }

    /// Run the startup protocol: read the first-run flag, restore the
    /// persisted session, then subscribe to auth changes for the rest of
    /// the manager's lifetime. `Initializing` ends only once both the flag
    /// read and the session fetch have resolved.
    pub async fn init(&self) -> Result<()> {
        let first_time = match self.flags.get(HAS_SEEN_ONBOARDING) {
            Ok(value) => value.is_none(),
            Err(err) => {
                // A broken local store must not re-show onboarding forever.
                warn!(error = %err, "First-run flag read failed, assuming onboarding done");
                false
            }
        };

        match self.backend.get_session().await {
            Ok(Some(session)) => {
                info!(user_id = %session.user_id, "Restored persisted session");
                let user_id = session.user_id;
                self.state.send_modify(|state| {
                    state.first_time = first_time;
                    state.phase = AuthPhase::Authenticated;
                    state.session = Some(session);
                });
                Self::load_profile(&self.backend, &self.state, user_id).await;
            }
            Ok(None) => {
                self.state.send_modify(|state| {
                    state.first_time = first_time;
                    state.phase = AuthPhase::Unauthenticated;
                });
            }
            Err(err) => {
                warn!(error = %err, "Session restore failed, starting signed out");
                self.state.send_modify(|state| {
                    state.first_time = first_time;
                    state.phase = AuthPhase::Unauthenticated;
                });
            }
        }

        let receiver = self.backend.subscribe_auth_changes();
        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            Self::run_listener(backend, state, receiver).await;
        });
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(previous) = listener.replace(handle) {
                previous.abort();
            }
        }
        Ok(())
    }

    /// Stop listening to auth changes. State stays readable afterwards.
    pub fn dispose(&self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(handle) = listener.take() {
                handle.abort();
            }
        }
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// The current state, cloned.
    #[must_use]
    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Register a new account and, when the backend created a user, the
    /// matching profile row seeded from `seed`. Profile-creation failure is
    /// logged but does not fail the sign-up: the account exists either way.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        seed: &ProfileSeed,
    ) -> Result<SignUpOutcome> {
        self.begin_operation();
        let outcome = match self.backend.sign_up(email, password, seed).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.finish_with_error(&err);
                return Err(err);
            }
        };

        if let Some(user_id) = outcome.user_id {
            let now = Utc::now();
            let profile = UserProfile {
                id: user_id,
                email: email.to_string(),
                full_name: seed.full_name.clone(),
                phone: seed.phone.clone(),
                business_name: seed.business_name.clone(),
                created_at: now,
                updated_at: now,
            };
            if let Err(err) = self.backend.create_user_profile(&profile).await {
                warn!(user_id = %user_id, error = %err, "Profile creation failed after sign-up");
            }
        }

        match &outcome.session {
            Some(session) => {
                let user_id = session.user_id;
                let session = session.clone();
                self.state.send_modify(|state| {
                    state.phase = AuthPhase::Authenticated;
                    state.session = Some(session);
                    state.last_error = None;
                });
                Self::load_profile(&self.backend, &self.state, user_id).await;
            }
            None => self.finish_ok(),
        }
        Ok(outcome)
    }

    /// Exchange credentials for a session. Never creates a profile.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        self.begin_operation();
        match self.backend.sign_in(email, password).await {
            Ok(session) => {
                let user_id = session.user_id;
                let held = session.clone();
                self.state.send_modify(|state| {
                    state.phase = AuthPhase::Authenticated;
                    state.session = Some(held);
                    state.last_error = None;
                });
                Self::load_profile(&self.backend, &self.state, user_id).await;
                Ok(session)
            }
            Err(err) => {
                self.finish_with_error(&err);
                Err(err)
            }
        }
    }

    /// Sign out. Held user and profile are cleared even when the backend
    /// call fails: local state must never contradict the user's action.
    pub async fn sign_out(&self) -> Result<()> {
        let result = self.backend.sign_out().await;
        if let Err(err) = &result {
            warn!(error = %err, "Backend sign-out failed, clearing local state anyway");
        }
        self.state.send_modify(|state| {
            state.phase = AuthPhase::Unauthenticated;
            state.session = None;
            state.profile = None;
        });
        result
    }

    /// Merge `patch` into the backend profile row and optimistically into
    /// the held profile. Fails fast with [`ZappiesError::NoActiveSession`]
    /// when signed out; no network call is made in that case.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<Option<UserProfile>> {
        let user_id = self.current().user_id().ok_or(ZappiesError::NoActiveSession)?;
        let updated_at = Utc::now();
        self.backend.update_user_profile(user_id, patch, updated_at).await?;

        let mut merged = None;
        self.state.send_modify(|state| {
            if let Some(profile) = &state.profile {
                let updated = patch.apply_to(profile, updated_at);
                merged = Some(updated.clone());
                state.profile = Some(updated);
            }
        });
        Ok(merged)
    }

    /// Request a password-reset email. Pass-through; no local state change.
    pub async fn reset_password(&self, email: &str) -> Result<()> {
        self.backend.reset_password(email, RESET_REDIRECT).await
    }

    /// Persist the first-run flag and clear `first_time`. Idempotent.
    pub fn complete_onboarding(&self) -> Result<()> {
        self.flags.set(HAS_SEEN_ONBOARDING, "true")?;
        self.state.send_modify(|state| state.first_time = false);
        Ok(())
    }

    fn begin_operation(&self) {
        self.state.send_modify(|state| {
            state.phase = AuthPhase::Authenticating;
            state.last_error = None;
        });
    }

    fn finish_ok(&self) {
        self.state.send_modify(|state| state.phase = state.stable_phase());
    }

    fn finish_with_error(&self, err: &ZappiesError) {
        let message = err.to_string();
        self.state.send_modify(|state| {
            state.last_error = Some(message);
            state.phase = state.stable_phase();
        });
    }

    /// Load the profile for `user_id` into state. A missing row leaves the
    /// profile `None`; a transport error leaves whatever was held before.
    async fn load_profile(
        backend: &Arc<dyn BackendClient>,
        state: &Arc<watch::Sender<SessionState>>,
        user_id: Uuid,
    ) {
        match backend.get_user_profile(user_id).await {
            Ok(profile) => {
                state.send_modify(|current| {
                    // Discard the result if the session changed underneath us.
                    if current.user_id() == Some(user_id) {
                        current.profile = profile;
                    }
                });
            }
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "Profile load failed");
            }
        }
    }

    async fn run_listener(
        backend: Arc<dyn BackendClient>,
        state: Arc<watch::Sender<SessionState>>,
        mut receiver: tokio::sync::mpsc::UnboundedReceiver<crate::models::AuthChange>,
    ) {
        while let Some(change) = receiver.recv().await {
            counter!(METRIC_AUTH_EVENTS_TOTAL).increment(1);
            debug!(kind = ?change.kind, "Auth change received");
            match change.session {
                Some(session) => {
                    let user_id = session.user_id;
                    state.send_modify(|current| {
                        current.phase = AuthPhase::Authenticated;
                        current.session = Some(session);
                    });
                    Self::load_profile(&backend, &state, user_id).await;
                }
                None => {
                    state.send_modify(|current| {
                        current.phase = AuthPhase::Unauthenticated;
                        current.session = None;
                        current.profile = None;
                    });
                }
            }
        }
        debug!("Auth change stream closed");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.dispose();
    }
}
