//! Tests for the in-memory backend contract

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use zappies_core::backend::{BackendClient, ChangeFilter};
use zappies_core::memory::{Fixture, FixtureAccount, MemoryBackend};
use zappies_core::models::{
    Bot, BotStatus, Business, ChangeKind, Conversation, EventFilter, ProfileSeed,
};
use zappies_core::schema;

fn uuid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn conversation(id: u128, bot_id: u128) -> Conversation {
    let now = Utc::now();
    Conversation {
        id: uuid(id),
        bot_id: uuid(bot_id),
        lead_status: None,
        source: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_sign_in_requires_matching_password() {
    let backend = MemoryBackend::new();
    backend.register_account("a@b.co", "Correct1x");

    assert!(backend.sign_in("a@b.co", "Correct1x").await.is_ok());
    assert!(backend.sign_in("a@b.co", "Wrong1xyz").await.is_err());
    assert!(backend.sign_in("missing@b.co", "Correct1x").await.is_err());
}

#[tokio::test]
async fn test_sign_in_is_case_insensitive_on_email() {
    let backend = MemoryBackend::new();
    backend.register_account("Owner@Example.com", "Correct1x");
    assert!(backend.sign_in("owner@example.com", "Correct1x").await.is_ok());
}

#[tokio::test]
async fn test_sign_up_rejects_short_password() {
    let backend = MemoryBackend::new();
    let result = backend.sign_up("a@b.co", "short", &ProfileSeed::default()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_refresh_rotates_access_token() {
    let backend = MemoryBackend::new();
    backend.register_account("a@b.co", "Correct1x");
    let session = backend.sign_in("a@b.co", "Correct1x").await.unwrap();

    let refreshed = backend.refresh_session().await.unwrap();
    assert_eq!(refreshed.user_id, session.user_id);
    assert_ne!(refreshed.access_token, session.access_token);
    assert_eq!(refreshed.refresh_token, session.refresh_token);
}

#[tokio::test]
async fn test_subscribe_changes_filters_by_column() {
    let backend = MemoryBackend::new();
    backend.insert_bot(Bot {
        id: uuid(1),
        business_id: uuid(10),
        name: "Alpha".to_string(),
        status: BotStatus::Active,
        total_conversations: 0,
        total_leads: 0,
        whatsapp_connected: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    });

    let mut receiver = backend
        .subscribe_changes(
            schema::conversations::TABLE,
            ChangeFilter::eq(schema::conversations::BOT_ID, uuid(1)),
            EventFilter::InsertOnly,
        )
        .await
        .unwrap();

    backend.insert_conversation(conversation(100, 1));
    backend.insert_conversation(conversation(101, 2)); // different bot, filtered out
    backend.insert_conversation(conversation(102, 1));

    let first = receiver.recv().await.unwrap();
    assert_eq!(first.kind, ChangeKind::Insert);
    assert_eq!(first.record["id"], serde_json::json!(uuid(100).to_string()));
    let second = receiver.recv().await.unwrap();
    assert_eq!(second.record["id"], serde_json::json!(uuid(102).to_string()));
}

#[tokio::test]
async fn test_insert_only_subscription_skips_updates() {
    let backend = MemoryBackend::new();
    let mut receiver = backend
        .subscribe_changes(
            schema::conversations::TABLE,
            ChangeFilter::eq(schema::conversations::BOT_ID, uuid(1)),
            EventFilter::InsertOnly,
        )
        .await
        .unwrap();

    backend.publish_change(
        schema::conversations::TABLE,
        ChangeKind::Update,
        serde_json::json!({ "bot_id": uuid(1).to_string() }),
    );
    backend.insert_conversation(conversation(100, 1));

    let event = receiver.recv().await.unwrap();
    assert_eq!(event.kind, ChangeKind::Insert);
}

#[tokio::test]
async fn test_fixture_round_trip() {
    let user_id = uuid(7);
    let fixture = Fixture {
        accounts: vec![FixtureAccount {
            email: "owner@example.com".to_string(),
            password: "Correct1x".to_string(),
            user_id,
        }],
        businesses: vec![Business {
            id: uuid(1),
            user_id,
            name: "Acme".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }],
        ..Default::default()
    };

    // Fixtures are JSON files in practice, so go through serde.
    let raw = serde_json::to_string(&fixture).unwrap();
    let parsed: Fixture = serde_json::from_str(&raw).unwrap();
    let backend = Arc::new(MemoryBackend::from_fixture(parsed));

    let session = backend.sign_in("owner@example.com", "Correct1x").await.unwrap();
    assert_eq!(session.user_id, user_id);
    let businesses = backend.get_user_businesses(user_id).await.unwrap();
    assert_eq!(businesses.len(), 1);
    assert_eq!(businesses[0].name, "Acme");
}
