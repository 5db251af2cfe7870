//! Backend client abstraction
//!
//! Everything the core needs from the remote store goes through the
//! [`BackendClient`] trait: the auth sub-API, the entity reads the
//! dashboard performs, and the two subscription channels. Concrete
//! implementations live in [`crate::supabase`] (HTTP) and
//! [`crate::memory`] (in-process, for tests and fixtures).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AnalyticsEvent, AuthChange, Bot, Business, ChangeEvent, Conversation, EventFilter,
    ProfilePatch, ProfileSeed, Session, SignUpOutcome, TimeWindow, UserProfile,
};

/// Equality filter for a realtime table subscription (`column = value`).
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    /// Column to match on
    pub column: String,
    /// Required value, compared as text
    pub equals: String,
}

impl ChangeFilter {
    /// Filter rows where `column` equals the textual form of `value`.
    #[must_use]
    pub fn eq(column: &str, value: impl ToString) -> Self {
        Self { column: column.to_string(), equals: value.to_string() }
    }
}

/// Async interface to the remote relational store and its auth service.
///
/// All methods may suspend; none of them block the scheduler. Errors are
/// per-call and carry no shared state, so a failed call never poisons the
/// client.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Register a new account. `metadata` is attached to the auth user;
    /// profile-row creation is a separate step owned by the session manager.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &ProfileSeed,
    ) -> Result<SignUpOutcome>;

    /// Exchange credentials for a session.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Invalidate the current session.
    async fn sign_out(&self) -> Result<()>;

    /// The currently persisted session, if any.
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Exchange the refresh token for a new session.
    async fn refresh_session(&self) -> Result<Session>;

    /// Request a password-reset email. `redirect_to` is the deep link the
    /// reset flow returns to.
    async fn reset_password(&self, email: &str, redirect_to: &str) -> Result<()>;

    /// Subscribe to auth-change notifications. Events arrive in emission
    /// order; the channel closes when the client is dropped.
    fn subscribe_auth_changes(&self) -> mpsc::UnboundedReceiver<AuthChange>;

    /// Insert a profile row. Fails if one already exists for the user.
    async fn create_user_profile(&self, profile: &UserProfile) -> Result<()>;

    /// Fetch the profile row for a user. A missing row is `Ok(None)`,
    /// never an error.
    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>>;

    /// Merge `patch` into the profile row for a user.
    async fn update_user_profile(
        &self,
        user_id: Uuid,
        patch: &ProfilePatch,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// All businesses owned by a user.
    async fn get_user_businesses(&self, user_id: Uuid) -> Result<Vec<Business>>;

    /// All bots belonging to a business.
    async fn get_bots(&self, business_id: Uuid) -> Result<Vec<Bot>>;

    /// All conversations across the bots of a business.
    async fn get_conversations(&self, business_id: Uuid) -> Result<Vec<Conversation>>;

    /// Analytics events for a business restricted to `window`.
    async fn get_analytics(
        &self,
        business_id: Uuid,
        window: &TimeWindow,
    ) -> Result<Vec<AnalyticsEvent>>;

    /// Subscribe to row changes on `table` matching `filter`. Used by
    /// conversation and message views; the core only forwards it.
    async fn subscribe_changes(
        &self,
        table: &str,
        filter: ChangeFilter,
        events: EventFilter,
    ) -> Result<mpsc::UnboundedReceiver<ChangeEvent>>;
}
