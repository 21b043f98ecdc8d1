//! Webhook ingestion
//!
//! Folds provider status events into stored intents. Event IDs are remembered
//! for a trailing window so redelivered events are dropped before the store is
//! touched.

use crate::provider::ProviderRegistry;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use payout_core::{
    update_with, Error, Metrics, PayoutIntent, PayoutStatus, PayoutStore, ProviderId, Result,
    WebhookEvent,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of ingesting one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Status changed to the contained value
    Applied(PayoutStatus),
    /// Intent already had this status
    Unchanged,
    /// Event ID seen inside the dedup window
    DuplicateEvent,
}

/// Event-id cache with a trailing time window
#[derive(Debug)]
pub struct DedupCache {
    window: Duration,
    // Map: event_id -> first seen
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl DedupCache {
    /// Create new cache
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Seen within the window
    pub fn contains(&self, event_id: &str, now: DateTime<Utc>) -> bool {
        self.seen
            .lock()
            .get(event_id)
            .map(|first_seen| now - *first_seen < self.window)
            .unwrap_or(false)
    }

    /// Record an event, purging entries that fell out of the window
    pub fn record(&self, event_id: &str, now: DateTime<Utc>) {
        let mut seen = self.seen.lock();
        let window = self.window;
        seen.retain(|_, first_seen| now - *first_seen < window);
        seen.entry(event_id.to_string()).or_insert(now);
    }

    /// Cached event count
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

/// Webhook ingestor
pub struct WebhookIngestor {
    store: Arc<dyn PayoutStore>,
    providers: Arc<ProviderRegistry>,
    dedup: DedupCache,
    metrics: Arc<Metrics>,
}

impl WebhookIngestor {
    /// Create new ingestor
    pub fn new(
        store: Arc<dyn PayoutStore>,
        providers: Arc<ProviderRegistry>,
        dedup_window: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            providers,
            dedup: DedupCache::new(dedup_window),
            metrics,
        }
    }

    /// Ingest a parsed, authenticated provider event
    pub async fn ingest(&self, provider: &ProviderId, event: WebhookEvent) -> Result<IngestOutcome> {
        let now = Utc::now();
        if self.dedup.contains(&event.event_id, now) {
            self.metrics.webhooks_duplicate.inc();
            debug!(event_id = %event.event_id, "Duplicate webhook event dropped");
            return Ok(IngestOutcome::DuplicateEvent);
        }

        let intent = self.resolve(&event).await?;
        if &intent.provider != provider {
            warn!(
                event_id = %event.event_id,
                payout_id = %intent.id,
                "Webhook from {} for payout owned by {}",
                provider,
                intent.provider
            );
            return Err(Error::PayoutNotFound(format!(
                "no payout for event {} from {}",
                event.event_id, provider
            )));
        }

        let outcome = self
            .apply(
                intent.id,
                event.status,
                &event.event_type,
                &format!("webhook:{}", provider),
                event.provider_payout_id.as_deref(),
                event.failure_code.as_deref(),
                event.failure_message.as_deref(),
            )
            .await?;

        // Only successfully processed events are remembered
        self.dedup.record(&event.event_id, now);
        Ok(outcome)
    }

    /// Poll the provider and fold the result through the same path
    pub async fn refresh_status(&self, payout_id: Uuid) -> Result<IngestOutcome> {
        let intent = self
            .store
            .get(payout_id)
            .await?
            .ok_or_else(|| Error::PayoutNotFound(payout_id.to_string()))?;

        let provider_payout_id = match &intent.provider_payout_id {
            Some(id) => id.clone(),
            None => {
                debug!(payout_id = %payout_id, "Not submitted yet; nothing to refresh");
                return Ok(IngestOutcome::Unchanged);
            }
        };

        let provider = self.providers.get(&intent.provider)?;
        let status = provider.get_payout_status(&provider_payout_id).await?;
        self.apply(
            payout_id,
            status,
            "status_poll",
            &format!("poll:{}", intent.provider),
            Some(&provider_payout_id),
            None,
            None,
        )
        .await
    }

    async fn resolve(&self, event: &WebhookEvent) -> Result<PayoutIntent> {
        if let Some(provider_payout_id) = &event.provider_payout_id {
            if let Some(intent) = self.store.get_by_provider_payout_id(provider_payout_id).await? {
                return Ok(intent);
            }
        }
        if let Some(payout_id) = event.payout_id {
            if let Some(intent) = self.store.get(payout_id).await? {
                return Ok(intent);
            }
        }
        Err(Error::PayoutNotFound(format!(
            "event {} (payout {:?}, provider payout {:?})",
            event.event_id, event.payout_id, event.provider_payout_id
        )))
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply(
        &self,
        payout_id: Uuid,
        status: PayoutStatus,
        event_type: &str,
        actor: &str,
        provider_payout_id: Option<&str>,
        failure_code: Option<&str>,
        failure_message: Option<&str>,
    ) -> Result<IngestOutcome> {
        let mut previous = status;
        let mut changed = false;

        let updated = update_with(self.store.as_ref(), payout_id, |p| {
            previous = p.status;
            changed = false;

            if p.status == status {
                // Redelivered terminal or repeated in-flight status
                if p.provider_payout_id.is_none() {
                    if let Some(id) = provider_payout_id {
                        p.provider_payout_id = Some(id.to_string());
                        return Ok(true);
                    }
                }
                return Ok(false);
            }

            let detail = format!("{} -> {} ({})", p.status, status, event_type);
            p.transition(status, "webhook", actor, &detail, Utc::now())?;
            if p.provider_payout_id.is_none() {
                p.provider_payout_id = provider_payout_id.map(String::from);
            }
            if let Some(code) = failure_code {
                p.failure_code = Some(code.to_string());
            }
            if let Some(message) = failure_message {
                p.failure_message = Some(message.to_string());
            }
            changed = true;
            Ok(true)
        })
        .await?;

        if !changed {
            debug!(payout_id = %payout_id, status = %status, "Status unchanged");
            return Ok(IngestOutcome::Unchanged);
        }

        self.metrics.webhooks_applied.inc();
        match updated.status {
            PayoutStatus::Succeeded => self.metrics.payouts_succeeded.inc(),
            PayoutStatus::Failed => self.metrics.payouts_failed.inc(),
            _ => {}
        }
        info!(
            payout_id = %payout_id,
            from = %previous,
            to = %updated.status,
            event_type,
            actor,
            "Payout status updated"
        );
        Ok(IngestOutcome::Applied(updated.status))
    }
}
