//! In-memory backend implementation
//!
//! A [`BackendClient`] over plain maps, used by the test suite and the
//! fixture-driven CLI. Besides the normal contract it supports failure and
//! latency injection so the aggregation failure policies can be exercised
//! deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::backend::{BackendClient, ChangeFilter};
use crate::error::{AuthError, Result, ZappiesError};
use crate::models::{
    AnalyticsEvent, AuthChange, AuthEventKind, Bot, Business, ChangeEvent, ChangeKind,
    Conversation, EventFilter, ProfilePatch, ProfileSeed, Session, SignUpOutcome, TimeWindow,
    UserProfile,
};
use crate::schema;

/// Minimum password length enforced by the simulated auth service.
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user_id: Uuid,
}

#[derive(Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    profiles: HashMap<Uuid, UserProfile>,
    businesses: Vec<Business>,
    bots: Vec<Bot>,
    conversations: Vec<Conversation>,
    analytics: Vec<AnalyticsEvent>,
    fail_businesses: HashSet<Uuid>,
    fetch_delays: HashMap<Uuid, Duration>,
    reset_requests: Vec<String>,
}

struct ChangeSubscriber {
    table: String,
    filter: ChangeFilter,
    events: EventFilter,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

/// JSON fixture describing a complete backend state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    /// Auth accounts usable with `sign_in`
    #[serde(default)]
    pub accounts: Vec<FixtureAccount>,
    /// Profile rows
    #[serde(default)]
    pub users: Vec<UserProfile>,
    /// Business rows
    #[serde(default)]
    pub businesses: Vec<Business>,
    /// Bot rows
    #[serde(default)]
    pub bots: Vec<Bot>,
    /// Conversation rows
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    /// Analytics event rows
    #[serde(default)]
    pub analytics: Vec<AnalyticsEvent>,
}

/// One auth account in a fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureAccount {
    /// Sign-in email
    pub email: String,
    /// Sign-in password
    pub password: String,
    /// Auth user id the account maps to
    pub user_id: Uuid,
}

/// In-memory [`BackendClient`] for tests and fixtures.
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    auth_subscribers: Mutex<Vec<mpsc::UnboundedSender<AuthChange>>>,
    change_subscribers: Mutex<Vec<ChangeSubscriber>>,
    fail_next_sign_out: AtomicBool,
    fail_profile_creation: AtomicBool,
    fail_business_list: AtomicBool,
}

impl MemoryBackend {
    /// Empty backend with no accounts or rows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated from a fixture.
    #[must_use]
    pub fn from_fixture(fixture: Fixture) -> Self {
        let backend = Self::new();
        {
            let mut tables = backend.lock_tables();
            for account in fixture.accounts {
                tables.accounts.insert(
                    account.email.to_lowercase(),
                    Account { password: account.password, user_id: account.user_id },
                );
            }
            for profile in fixture.users {
                tables.profiles.insert(profile.id, profile);
            }
            tables.businesses = fixture.businesses;
            tables.bots = fixture.bots;
            tables.conversations = fixture.conversations;
            tables.analytics = fixture.analytics;
        }
        backend
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        // Lock poisoning only happens after a panic in another test thread;
        // propagating it here would just obscure the original failure.
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register an account and return its user id.
    pub fn register_account(&self, email: &str, password: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        self.lock_tables()
            .accounts
            .insert(email.to_lowercase(), Account { password: password.to_string(), user_id });
        user_id
    }

    /// Install a pre-existing session, as if restored from device storage.
    pub fn set_session(&self, session: Session) {
        self.lock_tables().session = Some(session);
    }

    /// Seed a profile row.
    pub fn insert_profile(&self, profile: UserProfile) {
        self.lock_tables().profiles.insert(profile.id, profile);
    }

    /// Seed a business row.
    pub fn insert_business(&self, business: Business) {
        self.lock_tables().businesses.push(business);
    }

    /// Seed a bot row.
    pub fn insert_bot(&self, bot: Bot) {
        self.lock_tables().bots.push(bot);
    }

    /// Seed a conversation row and notify realtime subscribers.
    pub fn insert_conversation(&self, conversation: Conversation) {
        let record = serde_json::to_value(&conversation).unwrap_or_default();
        self.lock_tables().conversations.push(conversation);
        self.notify_change(schema::conversations::TABLE, ChangeKind::Insert, record);
    }

    /// Seed an analytics event row.
    pub fn insert_event(&self, event: AnalyticsEvent) {
        self.lock_tables().analytics.push(event);
    }

    /// Force the per-business fetch triple for `business_id` to fail.
    pub fn fail_business(&self, business_id: Uuid) {
        self.lock_tables().fail_businesses.insert(business_id);
    }

    /// Delay every fetch for `business_id`, to permute completion order.
    pub fn set_fetch_delay(&self, business_id: Uuid, delay: Duration) {
        self.lock_tables().fetch_delays.insert(business_id, delay);
    }

    /// Make the next `sign_out` call fail with a transport error.
    pub fn fail_next_sign_out(&self) {
        self.fail_next_sign_out.store(true, Ordering::SeqCst);
    }

    /// Make every `create_user_profile` call fail.
    pub fn fail_profile_creation(&self) {
        self.fail_profile_creation.store(true, Ordering::SeqCst);
    }

    /// Make `get_user_businesses` fail, the aggregator's one hard failure.
    pub fn fail_business_list(&self) {
        self.fail_business_list.store(true, Ordering::SeqCst);
    }

    /// Emails that requested a password reset, in request order.
    #[must_use]
    pub fn reset_requests(&self) -> Vec<String> {
        self.lock_tables().reset_requests.clone()
    }

    /// Emit a realtime change without touching stored rows.
    pub fn publish_change(&self, table: &str, kind: ChangeKind, record: serde_json::Value) {
        self.notify_change(table, kind, record);
    }

    fn emit_auth(&self, change: AuthChange) {
        if let Ok(mut subscribers) = self.auth_subscribers.lock() {
            subscribers.retain(|sender| sender.send(change.clone()).is_ok());
        }
    }

    fn notify_change(&self, table: &str, kind: ChangeKind, record: serde_json::Value) {
        let Ok(mut subscribers) = self.change_subscribers.lock() else {
            return;
        };
        subscribers.retain(|sub| {
            if sub.table != table || !sub.events.accepts(kind) {
                return true;
            }
            let matches = record
                .get(&sub.filter.column)
                .map(|value| match value {
                    serde_json::Value::String(text) => *text == sub.filter.equals,
                    other => other.to_string() == sub.filter.equals,
                })
                .unwrap_or(false);
            if !matches {
                return true;
            }
            sub.sender
                .send(ChangeEvent { table: table.to_string(), kind, record: record.clone() })
                .is_ok()
        });
    }

    fn new_session(user_id: Uuid, email: &str) -> Session {
        Session {
            user_id,
            email: email.to_string(),
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    async fn business_delay(&self, business_id: Uuid) {
        let delay = self.lock_tables().fetch_delays.get(&business_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_business_failure(&self, business_id: Uuid) -> Result<()> {
        if self.lock_tables().fail_businesses.contains(&business_id) {
            return Err(ZappiesError::Transport(format!(
                "Injected fetch failure for business {business_id}"
            )));
        }
        Ok(())
    }

    fn bot_ids_for_business(tables: &Tables, business_id: Uuid) -> HashSet<Uuid> {
        tables
            .bots
            .iter()
            .filter(|bot| bot.business_id == business_id)
            .map(|bot| bot.id)
            .collect()
    }
}

#[async_trait]
impl BackendClient for MemoryBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _metadata: &ProfileSeed,
    ) -> Result<SignUpOutcome> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword.into());
        }
        let email_key = email.to_lowercase();
        let mut tables = self.lock_tables();
        if tables.accounts.contains_key(&email_key) {
            return Err(AuthError::DuplicateEmail.into());
        }
        let user_id = Uuid::new_v4();
        tables
            .accounts
            .insert(email_key, Account { password: password.to_string(), user_id });
        // Accounts await email confirmation, so sign-up never yields a session.
        Ok(SignUpOutcome { user_id: Some(user_id), session: None })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = {
            let mut tables = self.lock_tables();
            let account = tables
                .accounts
                .get(&email.to_lowercase())
                .filter(|account| account.password == password)
                .cloned()
                .ok_or(AuthError::InvalidCredentials)?;
            let session = Self::new_session(account.user_id, email);
            tables.session = Some(session.clone());
            session
        };
        self.emit_auth(AuthChange { kind: AuthEventKind::SignedIn, session: Some(session.clone()) });
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if self.fail_next_sign_out.swap(false, Ordering::SeqCst) {
            return Err(ZappiesError::Transport("Injected sign-out failure".to_string()));
        }
        self.lock_tables().session = None;
        self.emit_auth(AuthChange { kind: AuthEventKind::SignedOut, session: None });
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        Ok(self.lock_tables().session.clone())
    }

    async fn refresh_session(&self) -> Result<Session> {
        let session = {
            let mut tables = self.lock_tables();
            let Some(current) = tables.session.clone() else {
                return Err(ZappiesError::NoActiveSession);
            };
            let refreshed = Session {
                access_token: Uuid::new_v4().to_string(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
                ..current
            };
            tables.session = Some(refreshed.clone());
            refreshed
        };
        self.emit_auth(AuthChange {
            kind: AuthEventKind::TokenRefreshed,
            session: Some(session.clone()),
        });
        Ok(session)
    }

    async fn reset_password(&self, email: &str, _redirect_to: &str) -> Result<()> {
        self.lock_tables().reset_requests.push(email.to_string());
        Ok(())
    }

    fn subscribe_auth_changes(&self) -> mpsc::UnboundedReceiver<AuthChange> {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.auth_subscribers.lock() {
            subscribers.push(sender);
        }
        receiver
    }

    async fn create_user_profile(&self, profile: &UserProfile) -> Result<()> {
        if self.fail_profile_creation.load(Ordering::SeqCst) {
            return Err(ZappiesError::Backend("Injected profile creation failure".to_string()));
        }
        let mut tables = self.lock_tables();
        if tables.profiles.contains_key(&profile.id) {
            return Err(ZappiesError::Backend(format!(
                "Profile already exists for user {}",
                profile.id
            )));
        }
        tables.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.lock_tables().profiles.get(&user_id).cloned())
    }

    async fn update_user_profile(
        &self,
        user_id: Uuid,
        patch: &ProfilePatch,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.lock_tables();
        if let Some(profile) = tables.profiles.get_mut(&user_id) {
            *profile = patch.apply_to(profile, updated_at);
        }
        // Matching zero rows is not an error, mirroring PostgREST updates.
        Ok(())
    }

    async fn get_user_businesses(&self, user_id: Uuid) -> Result<Vec<Business>> {
        if self.fail_business_list.load(Ordering::SeqCst) {
            return Err(ZappiesError::Transport("Injected business list failure".to_string()));
        }
        Ok(self
            .lock_tables()
            .businesses
            .iter()
            .filter(|business| business.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_bots(&self, business_id: Uuid) -> Result<Vec<Bot>> {
        self.business_delay(business_id).await;
        self.check_business_failure(business_id)?;
        Ok(self
            .lock_tables()
            .bots
            .iter()
            .filter(|bot| bot.business_id == business_id)
            .cloned()
            .collect())
    }

    async fn get_conversations(&self, business_id: Uuid) -> Result<Vec<Conversation>> {
        self.business_delay(business_id).await;
        self.check_business_failure(business_id)?;
        let tables = self.lock_tables();
        let bot_ids = Self::bot_ids_for_business(&tables, business_id);
        Ok(tables
            .conversations
            .iter()
            .filter(|conversation| bot_ids.contains(&conversation.bot_id))
            .cloned()
            .collect())
    }

    async fn get_analytics(
        &self,
        business_id: Uuid,
        window: &TimeWindow,
    ) -> Result<Vec<AnalyticsEvent>> {
        self.business_delay(business_id).await;
        self.check_business_failure(business_id)?;
        let tables = self.lock_tables();
        let bot_ids = Self::bot_ids_for_business(&tables, business_id);
        Ok(tables
            .analytics
            .iter()
            .filter(|event| bot_ids.contains(&event.bot_id) && window.contains(event.created_at))
            .cloned()
            .collect())
    }

    async fn subscribe_changes(
        &self,
        table: &str,
        filter: ChangeFilter,
        events: EventFilter,
    ) -> Result<mpsc::UnboundedReceiver<ChangeEvent>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut subscribers = self
            .change_subscribers
            .lock()
            .map_err(|_| ZappiesError::Other("Subscriber lock poisoned".to_string()))?;
        subscribers.push(ChangeSubscriber { table: table.to_string(), filter, events, sender });
        Ok(receiver)
    }
}
