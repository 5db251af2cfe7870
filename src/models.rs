//! Data models for the session and dashboard core
//!
//! This module contains all data structures exchanged with the backend,
//! the auth-change event types, and the derived dashboard snapshot.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated session as held by the backend.
///
/// Token handles are opaque; the core never inspects them beyond passing
/// the refresh token back for renewal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Id of the authenticated user
    pub user_id: Uuid,
    /// Email the session was established with
    pub email: String,
    /// Opaque access token
    pub access_token: String,
    /// Opaque refresh token
    pub refresh_token: String,
    /// Access token expiry
    pub expires_at: DateTime<Utc>,
}

/// Profile row for a user, created lazily on first sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Primary key, equal to the auth user id
    pub id: Uuid,
    /// Account email
    pub email: String,
    /// Display name
    pub full_name: String,
    /// Contact phone number
    pub phone: String,
    /// Name of the user's business
    pub business_name: String,
    /// Row creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Seed data captured by the sign-up form, used to create the profile row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSeed {
    /// Display name
    pub full_name: String,
    /// Contact phone number
    pub phone: String,
    /// Name of the user's business
    pub business_name: String,
}

/// Partial profile update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    /// New display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// New phone number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// New business name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
}

impl ProfilePatch {
    /// Apply this patch on top of an existing profile.
    #[must_use]
    pub fn apply_to(&self, profile: &UserProfile, updated_at: DateTime<Utc>) -> UserProfile {
        let mut merged = profile.clone();
        if let Some(full_name) = &self.full_name {
            merged.full_name = full_name.clone();
        }
        if let Some(phone) = &self.phone {
            merged.phone = phone.clone();
        }
        if let Some(business_name) = &self.business_name {
            merged.business_name = business_name.clone();
        }
        merged.updated_at = updated_at;
        merged
    }
}

/// A tenant grouping of bots owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Business {
    /// Primary key
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// Business display name
    pub name: String,
    /// Row creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status of a bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    /// Created but not yet published
    Draft,
    /// Live and answering conversations
    Active,
    /// Disabled by the owner
    Inactive,
}

/// A configured WhatsApp conversational agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    /// Primary key
    pub id: Uuid,
    /// Owning business
    pub business_id: Uuid,
    /// Bot display name
    pub name: String,
    /// Lifecycle status
    pub status: BotStatus,
    /// Denormalized conversation counter
    #[serde(default)]
    pub total_conversations: u64,
    /// Denormalized lead counter
    #[serde(default)]
    pub total_leads: u64,
    /// True once the bot is linked to a WhatsApp number
    #[serde(default)]
    pub whatsapp_connected: bool,
    /// Row creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// A thread between a bot and an external contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Primary key
    pub id: Uuid,
    /// Bot handling the thread
    pub bot_id: Uuid,
    /// Lead qualification status, free-form (`"qualified"` counts as a lead)
    #[serde(default)]
    pub lead_status: Option<String>,
    /// Lead source label, free-form
    #[serde(default)]
    pub source: Option<String>,
    /// Row creation timestamp
    pub created_at: DateTime<Utc>,
    /// Timestamp of the latest activity
    pub updated_at: DateTime<Utc>,
}

/// Lead status value that qualifies a conversation as a lead.
pub const LEAD_STATUS_QUALIFIED: &str = "qualified";

/// A timestamped record of bot activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// Primary key
    pub id: Uuid,
    /// Bot that produced the event
    pub bot_id: Uuid,
    /// True when the bot answered the triggering message
    #[serde(default)]
    pub responded: bool,
    /// Event timestamp
    pub created_at: DateTime<Utc>,
}

/// Closed time window for analytics queries, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Window start (inclusive)
    pub start: DateTime<Utc>,
    /// Window end (inclusive)
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Window from the start of the current week (Sunday 00:00 UTC) to `now`.
    #[must_use]
    pub fn week_to_date(now: DateTime<Utc>) -> Self {
        let days_from_sunday = i64::from(now.date_naive().weekday().num_days_from_sunday());
        let start_of_week = (now - chrono::Duration::days(days_from_sunday))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();
        Self { start: start_of_week, end: now }
    }

    /// Window covering the trailing `days` days up to `now`.
    #[must_use]
    pub fn trailing_days(now: DateTime<Utc>, days: u32) -> Self {
        Self { start: now - chrono::Duration::days(i64::from(days)), end: now }
    }

    /// True when `instant` falls inside the window.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// Kind of auth-change notification emitted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthEventKind {
    /// A user signed in
    SignedIn,
    /// The current user signed out
    SignedOut,
    /// The access token was refreshed
    TokenRefreshed,
    /// User metadata changed
    UserUpdated,
}

/// A single event on the auth-change stream.
#[derive(Debug, Clone)]
pub struct AuthChange {
    /// What happened
    pub kind: AuthEventKind,
    /// The session after the event, if one exists
    pub session: Option<Session>,
}

/// Outcome of a sign-up call.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    /// The created user id, if an account was created
    pub user_id: Option<Uuid>,
    /// A session, when the backend confirms accounts immediately
    pub session: Option<Session>,
}

/// Kind of a realtime table change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A row was inserted
    Insert,
    /// A row was updated
    Update,
    /// A row was deleted
    Delete,
}

/// Which change kinds a realtime subscription wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Deliver inserts, updates and deletes
    All,
    /// Deliver inserts only
    InsertOnly,
}

impl EventFilter {
    /// True when `kind` passes this filter.
    #[must_use]
    pub fn accepts(self, kind: ChangeKind) -> bool {
        match self {
            Self::All => true,
            Self::InsertOnly => kind == ChangeKind::Insert,
        }
    }
}

/// A realtime change event delivered to table subscribers.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Table the change happened on
    pub table: String,
    /// Kind of change
    pub kind: ChangeKind,
    /// The affected row as an opaque record
    pub record: serde_json::Value,
}

/// Message volume attributed to a single bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotMessageCount {
    /// The bot
    pub bot_id: Uuid,
    /// Bot display name at aggregation time
    pub bot_name: String,
    /// Analytics events referencing the bot in the window
    pub messages: u64,
}

/// Conversation count for one lead source label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadSourceCount {
    /// Source label, or the fallback label when missing
    pub source: String,
    /// Conversations attributed to the source
    pub count: u64,
}

/// Immutable derived summary consumed by the presentation layer.
///
/// Recomputed wholesale on every refresh; never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    /// Total number of bots across all businesses
    pub total_bots: u64,
    /// Conversations updated within 24 hours of the reference time
    pub active_conversations_24h: u64,
    /// Conversations with a qualified lead status
    pub total_qualified_leads: u64,
    /// Raw response rate in percent, 0 for an empty sample
    pub response_rate_percent: f64,
    /// Event counts per calendar day of week, 0 = Sunday .. 6 = Saturday
    pub weekly_message_series: [u64; 7],
    /// Message counts for the first five bots encountered
    pub per_bot_message_counts: Vec<BotMessageCount>,
    /// Conversation counts grouped by lead source
    pub lead_source_breakdown: Vec<LeadSourceCount>,
}

impl DashboardSnapshot {
    /// The all-zero snapshot returned when the user owns no businesses.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            total_bots: 0,
            active_conversations_24h: 0,
            total_qualified_leads: 0,
            response_rate_percent: 0.0,
            weekly_message_series: [0; 7],
            per_bot_message_counts: Vec::new(),
            lead_source_breakdown: Vec::new(),
        }
    }

    /// Response rate rounded to two decimals for display.
    #[must_use]
    pub fn response_rate_display(&self) -> f64 {
        (self.response_rate_percent * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn week_to_date_starts_on_sunday() {
        // 2026-08-26 is a Wednesday
        let now = Utc.with_ymd_and_hms(2026, 8, 26, 15, 30, 0).unwrap();
        let window = TimeWindow::week_to_date(now);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 8, 23, 0, 0, 0).unwrap());
        assert_eq!(window.end, now);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let start = Utc.with_ymd_and_hms(2026, 8, 23, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 8, 26, 0, 0, 0).unwrap();
        let window = TimeWindow { start, end };
        assert!(window.contains(start));
        assert!(window.contains(end));
        assert!(!window.contains(end + chrono::Duration::seconds(1)));
    }

    #[test]
    fn profile_patch_leaves_unset_fields() {
        let now = Utc::now();
        let profile = UserProfile {
            id: Uuid::new_v4(),
            email: "owner@example.com".to_string(),
            full_name: "Ada".to_string(),
            phone: "+1555123456".to_string(),
            business_name: "Ada's Bakery".to_string(),
            created_at: now,
            updated_at: now,
        };
        let patch = ProfilePatch { phone: Some("+1555000000".to_string()), ..Default::default() };
        let merged = patch.apply_to(&profile, now);
        assert_eq!(merged.phone, "+1555000000");
        assert_eq!(merged.full_name, "Ada");
        assert_eq!(merged.business_name, "Ada's Bakery");
    }
}
