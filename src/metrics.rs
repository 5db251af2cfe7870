//! Dashboard metric derivation
//!
//! Pure, deterministic functions turning the merged per-business
//! collections into the [`DashboardSnapshot`] the UI renders. Everything
//! here is a total function of its inputs plus the reference time, so
//! replaying an aggregation against unchanged data yields an identical
//! snapshot. Also holds the metric names recorded through the `metrics`
//! facade by the aggregator and session manager.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::models::{
    AnalyticsEvent, Bot, BotMessageCount, Conversation, DashboardSnapshot, LeadSourceCount,
    TimeWindow, LEAD_STATUS_QUALIFIED,
};

/// Label used when a conversation has no lead source.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Number of bots broken out individually in the snapshot.
pub const TOP_BOT_COUNT: usize = 5;

/// Counter: aggregations started.
pub const METRIC_AGGREGATIONS_TOTAL: &str = "zappies_aggregations_total";
/// Counter: per-business fetches that failed and were skipped.
pub const METRIC_BUSINESS_FETCH_FAILURES: &str = "zappies_business_fetch_failures_total";
/// Histogram: wall time of one aggregation in seconds.
pub const METRIC_AGGREGATION_DURATION: &str = "zappies_aggregation_duration_seconds";
/// Counter: auth-change events processed by the session manager.
pub const METRIC_AUTH_EVENTS_TOTAL: &str = "zappies_auth_events_total";

/// Pure snapshot derivation over the merged collections.
#[derive(Debug, Copy, Clone)]
pub struct MetricsComputer;

impl MetricsComputer {
    /// Derive a complete snapshot from the flat collections.
    ///
    /// `now` anchors the 24-hour activity cutoff; `window` bounds the
    /// analytics sample. Input order within each collection does not
    /// affect any scalar or the weekly series; `bots` order determines
    /// which bots appear in the per-bot breakdown.
    #[must_use]
    pub fn compute(
        bots: &[Bot],
        conversations: &[Conversation],
        events: &[AnalyticsEvent],
        window: &TimeWindow,
        now: DateTime<Utc>,
    ) -> DashboardSnapshot {
        DashboardSnapshot {
            total_bots: bots.len() as u64,
            active_conversations_24h: Self::active_conversations_24h(conversations, now),
            total_qualified_leads: Self::qualified_leads(conversations),
            response_rate_percent: Self::response_rate_percent(events),
            weekly_message_series: Self::weekly_message_series(events, window),
            per_bot_message_counts: Self::per_bot_message_counts(bots, events),
            lead_source_breakdown: Self::lead_source_breakdown(conversations),
        }
    }

    /// Conversations touched within the 24 hours preceding `now`.
    #[must_use]
    pub fn active_conversations_24h(conversations: &[Conversation], now: DateTime<Utc>) -> u64 {
        let cutoff = now - Duration::hours(24);
        conversations.iter().filter(|conversation| conversation.updated_at > cutoff).count() as u64
    }

    /// Conversations whose lead status is `qualified`.
    #[must_use]
    pub fn qualified_leads(conversations: &[Conversation]) -> u64 {
        conversations
            .iter()
            .filter(|conversation| {
                conversation.lead_status.as_deref() == Some(LEAD_STATUS_QUALIFIED)
            })
            .count() as u64
    }

    /// Percentage of events the bot answered. An empty sample is 0, not NaN.
    #[must_use]
    pub fn response_rate_percent(events: &[AnalyticsEvent]) -> f64 {
        if events.is_empty() {
            return 0.0;
        }
        let responded = events.iter().filter(|event| event.responded).count();
        responded as f64 / events.len() as f64 * 100.0
    }

    /// Event counts bucketed by calendar day of week, 0 = Sunday.
    ///
    /// Only events inside `window` are counted, so the bucket sum equals
    /// the windowed event count.
    #[must_use]
    pub fn weekly_message_series(events: &[AnalyticsEvent], window: &TimeWindow) -> [u64; 7] {
        let mut buckets = [0u64; 7];
        for event in events {
            if window.contains(event.created_at) {
                let day = event.created_at.weekday().num_days_from_sunday() as usize;
                buckets[day] += 1;
            }
        }
        buckets
    }

    /// Event counts for the first [`TOP_BOT_COUNT`] bots, in encounter order.
    #[must_use]
    pub fn per_bot_message_counts(bots: &[Bot], events: &[AnalyticsEvent]) -> Vec<BotMessageCount> {
        bots.iter()
            .take(TOP_BOT_COUNT)
            .map(|bot| BotMessageCount {
                bot_id: bot.id,
                bot_name: bot.name.clone(),
                messages: events.iter().filter(|event| event.bot_id == bot.id).count() as u64,
            })
            .collect()
    }

    /// Conversation counts grouped by source label, sorted by label so the
    /// breakdown is stable across replays.
    #[must_use]
    pub fn lead_source_breakdown(conversations: &[Conversation]) -> Vec<LeadSourceCount> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for conversation in conversations {
            let source = conversation
                .source
                .as_deref()
                .filter(|label| !label.is_empty())
                .unwrap_or(UNKNOWN_SOURCE);
            *counts.entry(source.to_string()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|(source, count)| LeadSourceCount { source, count })
            .collect()
    }
}
