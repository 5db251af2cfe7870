//! Supabase backend implementation
//!
//! [`BackendClient`] over a Supabase project: GoTrue for the auth sub-API
//! and PostgREST for entity reads and writes. Auth-change events are
//! emitted client-side when sign-in, sign-out or token refresh succeed.
//! The realtime table subscription is a polling fallback keyed on each
//! row's `created_at`, which surfaces inserts only.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{BackendClient, ChangeFilter};
use crate::config::BackendConfig;
use crate::error::{AuthError, Result, ZappiesError};
use crate::models::{
    AnalyticsEvent, AuthChange, AuthEventKind, Bot, Business, ChangeEvent, ChangeKind,
    Conversation, EventFilter, ProfilePatch, ProfileSeed, Session, SignUpOutcome, TimeWindow,
    UserProfile,
};
use crate::schema;

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, fallback_email: &str) -> Session {
        let expires_in = self.expires_in.unwrap_or(3600);
        Session {
            user_id: self.user.id,
            email: self.user.email.unwrap_or_else(|| fallback_email.to_string()),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        }
    }
}

/// HTTP [`BackendClient`] for a Supabase project.
pub struct SupabaseBackend {
    http: Client,
    base_url: String,
    anon_key: String,
    session: Arc<Mutex<Option<Session>>>,
    auth_subscribers: Mutex<Vec<mpsc::UnboundedSender<AuthChange>>>,
    poll_interval: Duration,
}

impl SupabaseBackend {
    /// Client for the project described by `config`.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            session: Arc::new(Mutex::new(None)),
            auth_subscribers: Mutex::new(Vec::new()),
            poll_interval: Duration::from_secs(config.realtime_poll_interval_secs),
        })
    }

    fn auth_endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn rest_endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn current_token(&self) -> String {
        self.session
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|session| session.access_token.clone()))
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.anon_key).bearer_auth(self.current_token())
    }

    fn store_session(&self, session: Option<Session>) {
        if let Ok(mut guard) = self.session.lock() {
            *guard = session;
        }
    }

    fn emit_auth(&self, change: AuthChange) {
        if let Ok(mut subscribers) = self.auth_subscribers.lock() {
            subscribers.retain(|sender| sender.send(change.clone()).is_ok());
        }
    }

    /// Turn a failed auth response into the specific [`AuthError`] the UI
    /// surfaces verbatim.
    async fn auth_failure(response: Response) -> ZappiesError {
        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let message = body
            .get("error_description")
            .or_else(|| body.get("msg"))
            .or_else(|| body.get("message"))
            .and_then(|value| value.as_str())
            .unwrap_or("Authentication failed")
            .to_string();
        let lowered = message.to_lowercase();
        let auth_error = if lowered.contains("invalid login credentials") {
            AuthError::InvalidCredentials
        } else if lowered.contains("already registered") || lowered.contains("already exists") {
            AuthError::DuplicateEmail
        } else if lowered.contains("password") {
            AuthError::WeakPassword
        } else {
            AuthError::Other(format!("{message} (status {status})"))
        };
        auth_error.into()
    }

    async fn check_rest(response: Response, table: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ZappiesError::Backend(format!("{table} request failed with {status}: {body}")))
    }

    async fn rest_get<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let response = self
            .authed(self.http.get(self.rest_endpoint(table)))
            .query(&[("select", "*")])
            .query(filters)
            .send()
            .await?;
        let response = Self::check_rest(response, table).await?;
        Ok(response.json().await?)
    }

    async fn bot_ids(&self, business_id: Uuid) -> Result<Vec<Uuid>> {
        let bots = self.get_bots(business_id).await?;
        Ok(bots.into_iter().map(|bot| bot.id).collect())
    }

    fn in_filter(ids: &[Uuid]) -> String {
        let joined = ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
        format!("in.({joined})")
    }
}

#[async_trait]
impl BackendClient for SupabaseBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &ProfileSeed,
    ) -> Result<SignUpOutcome> {
        let response = self
            .authed(self.http.post(self.auth_endpoint("signup")))
            .json(&json!({
                "email": email,
                "password": password,
                "data": metadata,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::auth_failure(response).await);
        }

        // GoTrue answers with a bare user when confirmation is pending and
        // with a token payload when accounts are auto-confirmed.
        let body: serde_json::Value = response.json().await?;
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)?;
            let session = token.into_session(email);
            self.store_session(Some(session.clone()));
            self.emit_auth(AuthChange {
                kind: AuthEventKind::SignedIn,
                session: Some(session.clone()),
            });
            return Ok(SignUpOutcome { user_id: Some(session.user_id), session: Some(session) });
        }

        let user_id = body
            .get("user")
            .and_then(|user| user.get("id"))
            .or_else(|| body.get("id"))
            .and_then(|value| value.as_str())
            .and_then(|raw| Uuid::parse_str(raw).ok());
        Ok(SignUpOutcome { user_id, session: None })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let response = self
            .authed(self.http.post(self.auth_endpoint("token")))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::auth_failure(response).await);
        }
        let token: TokenResponse = response.json().await?;
        let session = token.into_session(email);
        self.store_session(Some(session.clone()));
        self.emit_auth(AuthChange { kind: AuthEventKind::SignedIn, session: Some(session.clone()) });
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let response = self.authed(self.http.post(self.auth_endpoint("logout"))).send().await?;
        if !response.status().is_success() {
            return Err(Self::auth_failure(response).await);
        }
        self.store_session(None);
        self.emit_auth(AuthChange { kind: AuthEventKind::SignedOut, session: None });
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>> {
        Ok(self.session.lock().ok().and_then(|guard| guard.clone()))
    }

    async fn refresh_session(&self) -> Result<Session> {
        let refresh_token = self
            .session
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|session| session.refresh_token.clone()))
            .ok_or(ZappiesError::NoActiveSession)?;
        let email = self
            .session
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|session| session.email.clone()))
            .unwrap_or_default();

        let response = self
            .authed(self.http.post(self.auth_endpoint("token")))
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::auth_failure(response).await);
        }
        let token: TokenResponse = response.json().await?;
        let session = token.into_session(&email);
        self.store_session(Some(session.clone()));
        self.emit_auth(AuthChange {
            kind: AuthEventKind::TokenRefreshed,
            session: Some(session.clone()),
        });
        Ok(session)
    }

    async fn reset_password(&self, email: &str, redirect_to: &str) -> Result<()> {
        let response = self
            .authed(self.http.post(self.auth_endpoint("recover")))
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::auth_failure(response).await);
        }
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
        let response = self
            .authed(self.http.post(self.rest_endpoint(schema::users::TABLE)))
            .header("Prefer", "return=minimal")
            .json(profile)
            .send()
            .await?;
        Self::check_rest(response, schema::users::TABLE).await?;
        Ok(())
    }

    async fn get_user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        let rows: Vec<UserProfile> = self
            .rest_get(
                schema::users::TABLE,
                &[(schema::users::ID, format!("eq.{user_id}")), ("limit", "1".to_string())],
            )
            .await?;
        // An empty result set is the precise "profile not found" condition.
        Ok(rows.into_iter().next())
    }

    async fn update_user_profile(
        &self,
        user_id: Uuid,
        patch: &ProfilePatch,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut body = serde_json::to_value(patch)?;
        if let Some(map) = body.as_object_mut() {
            map.insert("updated_at".to_string(), json!(updated_at.to_rfc3339()));
        }
        let response = self
            .authed(self.http.patch(self.rest_endpoint(schema::users::TABLE)))
            .query(&[(schema::users::ID, format!("eq.{user_id}"))])
            .header("Prefer", "return=minimal")
            .json(&body)
            .send()
            .await?;
        Self::check_rest(response, schema::users::TABLE).await?;
        Ok(())
    }

    async fn get_user_businesses(&self, user_id: Uuid) -> Result<Vec<Business>> {
        self.rest_get(
            schema::businesses::TABLE,
            &[(schema::businesses::USER_ID, format!("eq.{user_id}"))],
        )
        .await
    }

    async fn get_bots(&self, business_id: Uuid) -> Result<Vec<Bot>> {
        self.rest_get(
            schema::bots::TABLE,
            &[(schema::bots::BUSINESS_ID, format!("eq.{business_id}"))],
        )
        .await
    }

    async fn get_conversations(&self, business_id: Uuid) -> Result<Vec<Conversation>> {
        let bot_ids = self.bot_ids(business_id).await?;
        if bot_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.rest_get(
            schema::conversations::TABLE,
            &[(schema::conversations::BOT_ID, Self::in_filter(&bot_ids))],
        )
        .await
    }

    async fn get_analytics(
        &self,
        business_id: Uuid,
        window: &TimeWindow,
    ) -> Result<Vec<AnalyticsEvent>> {
        let bot_ids = self.bot_ids(business_id).await?;
        if bot_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.rest_get(
            schema::analytics::TABLE,
            &[
                (schema::analytics::BOT_ID, Self::in_filter(&bot_ids)),
                (schema::analytics::CREATED_AT, format!("gte.{}", window.start.to_rfc3339())),
                (schema::analytics::CREATED_AT, format!("lte.{}", window.end.to_rfc3339())),
            ],
        )
        .await
    }

    async fn subscribe_changes(
        &self,
        table: &str,
        filter: ChangeFilter,
        events: EventFilter,
    ) -> Result<mpsc::UnboundedReceiver<ChangeEvent>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let http = self.http.clone();
        let url = self.rest_endpoint(table);
        let anon_key = self.anon_key.clone();
        let session = Arc::clone(&self.session);
        let poll_interval = self.poll_interval;
        let table = table.to_string();

        tokio::spawn(async move {
            let mut watermark: Option<String> = None;
            let mut primed = false;
            loop {
                if sender.is_closed() {
                    break;
                }
                tokio::time::sleep(poll_interval).await;

                let mut query: Vec<(String, String)> = vec![
                    ("select".to_string(), "*".to_string()),
                    (filter.column.clone(), format!("eq.{}", filter.equals)),
                    ("order".to_string(), "created_at.asc".to_string()),
                ];
                if let Some(mark) = &watermark {
                    query.push(("created_at".to_string(), format!("gt.{mark}")));
                }
                let token = session
                    .lock()
                    .ok()
                    .and_then(|guard| {
                        guard.as_ref().map(|current| current.access_token.clone())
                    })
                    .unwrap_or_else(|| anon_key.clone());

                let response = http
                    .get(&url)
                    .header("apikey", &anon_key)
                    .bearer_auth(token)
                    .query(&query)
                    .send()
                    .await;
                let rows: Vec<serde_json::Value> = match response {
                    Ok(response) if response.status().is_success() => {
                        response.json().await.unwrap_or_default()
                    }
                    Ok(response) => {
                        warn!(table = %table, status = %response.status(), "Realtime poll failed");
                        continue;
                    }
                    Err(err) => {
                        warn!(table = %table, error = %err, "Realtime poll failed");
                        continue;
                    }
                };

                for row in rows {
                    if let Some(created_at) = row.get("created_at").and_then(|v| v.as_str()) {
                        if watermark.as_deref().map_or(true, |mark| created_at > mark) {
                            watermark = Some(created_at.to_string());
                        }
                    }
                    // The first pass only establishes the watermark so
                    // pre-existing rows are not replayed as inserts.
                    if primed && events.accepts(ChangeKind::Insert) {
                        let event = ChangeEvent {
                            table: table.clone(),
                            kind: ChangeKind::Insert,
                            record: row,
                        };
                        if sender.send(event).is_err() {
                            return;
                        }
                    }
                }
                primed = true;
            }
            debug!(table = %table, "Realtime poll stopped");
        });

        Ok(receiver)
    }
}
