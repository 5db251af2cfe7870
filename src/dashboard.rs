//! Dashboard aggregation pipeline
//!
//! [`DashboardAggregator`] fans out across a user's businesses, collects
//! bots, conversations and analytics events, tolerates per-business
//! failures, and derives a [`DashboardSnapshot`] through
//! [`MetricsComputer`]. Only the business-list fetch is a hard failure;
//! a single bad business degrades the snapshot instead of failing it.
//!
//! Refreshes are guarded by a generation counter: the snapshot of a
//! superseded aggregation is discarded, never merged with a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::BackendClient;
use crate::error::Result;
use crate::metrics::{
    MetricsComputer, METRIC_AGGREGATIONS_TOTAL, METRIC_AGGREGATION_DURATION,
    METRIC_BUSINESS_FETCH_FAILURES,
};
use crate::models::{AnalyticsEvent, Bot, Conversation, DashboardSnapshot, TimeWindow};

/// Default bound on concurrently fetched businesses.
pub const DEFAULT_FAN_OUT: usize = 8;

struct BusinessData {
    bots: Vec<Bot>,
    conversations: Vec<Conversation>,
    events: Vec<AnalyticsEvent>,
}

/// Fans out per-business fetches and derives dashboard snapshots.
pub struct DashboardAggregator {
    backend: Arc<dyn BackendClient>,
    snapshot: watch::Sender<Option<DashboardSnapshot>>,
    generation: AtomicU64,
    fan_out: usize,
}

impl DashboardAggregator {
    /// Aggregator with `fan_out` bounding how many businesses are fetched
    /// at once. A bound of zero is treated as one.
    #[must_use]
    pub fn new(backend: Arc<dyn BackendClient>, fan_out: usize) -> Self {
        let (sender, _receiver) = watch::channel(None);
        Self { backend, snapshot: sender, generation: AtomicU64::new(0), fan_out: fan_out.max(1) }
    }

    /// Subscribe to published snapshots. `None` until the first refresh
    /// completes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<DashboardSnapshot>> {
        self.snapshot.subscribe()
    }

    /// The most recently published snapshot, if any.
    #[must_use]
    pub fn latest(&self) -> Option<DashboardSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Clear the published snapshot and discard any in-flight aggregation,
    /// e.g. when the dashboard view is left before a refresh finishes.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.snapshot.send_replace(None);
    }

    /// Compute a snapshot without publishing it.
    ///
    /// A total function of the user, the backend state, `window` and `now`:
    /// replaying against unchanged data yields an identical snapshot, and
    /// the order in which per-business fetches complete cannot affect the
    /// result because merges happen in business-list order.
    pub async fn aggregate(
        &self,
        user_id: Uuid,
        window: &TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<DashboardSnapshot> {
        counter!(METRIC_AGGREGATIONS_TOTAL).increment(1);
        let started = Instant::now();

        let businesses = self.backend.get_user_businesses(user_id).await?;
        if businesses.is_empty() {
            return Ok(DashboardSnapshot::empty());
        }

        // Owned ids keep the fan-out future free of borrows, so callers can
        // spawn a refresh onto the runtime.
        let business_ids: Vec<Uuid> = businesses.iter().map(|business| business.id).collect();
        let results: Vec<(Uuid, Result<BusinessData>)> =
            stream::iter(business_ids.into_iter().map(|business_id| {
                let backend = Arc::clone(&self.backend);
                let window = *window;
                async move { (business_id, Self::fetch_business(&backend, business_id, window).await) }
            }))
            .buffered(self.fan_out)
            .collect()
            .await;

        let mut bots = Vec::new();
        let mut conversations = Vec::new();
        let mut events = Vec::new();
        let mut failed = 0usize;
        for (business_id, result) in results {
            match result {
                Ok(data) => {
                    bots.extend(data.bots);
                    conversations.extend(data.conversations);
                    events.extend(data.events);
                }
                Err(err) => {
                    failed += 1;
                    counter!(METRIC_BUSINESS_FETCH_FAILURES).increment(1);
                    warn!(%business_id, error = %err, "Business fetch failed, skipping it");
                }
            }
        }
        if failed > 0 {
            warn!(failed, total = businesses.len(), "Partial aggregation failure, snapshot is best-effort");
        }

        let snapshot = MetricsComputer::compute(&bots, &conversations, &events, window, now);
        histogram!(METRIC_AGGREGATION_DURATION).record(started.elapsed().as_secs_f64());
        Ok(snapshot)
    }

    /// Aggregate and publish, unless a newer refresh was initiated while
    /// this one ran. Returns the snapshot when it was published, `None`
    /// when it was superseded and discarded.
    pub async fn refresh(
        &self,
        user_id: Uuid,
        window: &TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<Option<DashboardSnapshot>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = self.aggregate(user_id, window, now).await?;
        let mut published = false;
        self.snapshot.send_if_modified(|current| {
            // Checked under the channel lock so a refresh initiated after
            // this one cannot have its snapshot overwritten by this one.
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = Some(snapshot.clone());
            published = true;
            true
        });
        if published {
            Ok(Some(snapshot))
        } else {
            debug!(generation, "Discarding superseded aggregation result");
            Ok(None)
        }
    }

    /// Fetch one business's triple. The three queries run concurrently;
    /// any failure fails the whole triple so the business contributes
    /// nothing rather than a partial row set.
    async fn fetch_business(
        backend: &Arc<dyn BackendClient>,
        business_id: Uuid,
        window: TimeWindow,
    ) -> Result<BusinessData> {
        let (bots, conversations, events) = tokio::try_join!(
            backend.get_bots(business_id),
            backend.get_conversations(business_id),
            backend.get_analytics(business_id, &window),
        )?;
        Ok(BusinessData { bots, conversations, events })
    }
}
