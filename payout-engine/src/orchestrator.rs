//! Submission orchestrator
//!
//! Drives an `approved` intent through its provider with bounded retry. Each
//! attempt re-reads the intent, so a cancel issued between attempts stops the
//! loop. No store-wide lock is held while sleeping.

use crate::provider::ProviderRegistry;
use crate::retry::{provider_message, RetryPolicy};
use chrono::Utc;
use payout_core::{
    update_with, Metrics, PayoutIntent, PayoutStatus, PayoutStore, Result,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Failure code for a non-retryable provider error
pub const FAILURE_PROVIDER_ERROR: &str = "provider_error";
/// Failure code for a retryable error on the last attempt
pub const FAILURE_RETRIES_EXHAUSTED: &str = "retries_exhausted";

const ACTOR: &str = "orchestrator";

/// Submission orchestrator
pub struct SubmissionOrchestrator {
    store: Arc<dyn PayoutStore>,
    providers: Arc<ProviderRegistry>,
    retry: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl SubmissionOrchestrator {
    /// Create new orchestrator
    pub fn new(
        store: Arc<dyn PayoutStore>,
        providers: Arc<ProviderRegistry>,
        retry: RetryPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            providers,
            retry,
            metrics,
        }
    }

    /// Submit a payout, retrying retryable provider errors
    ///
    /// Returns the final stored intent; a provider failure is recorded on the
    /// intent (`failed`) rather than returned as an error.
    pub async fn submit(&self, payout_id: Uuid) -> Result<PayoutIntent> {
        let initial = self.load(payout_id).await?;
        let provider = self.providers.get(&initial.provider)?;
        let max_attempts = self.retry.max_attempts();

        let mut attempt = 1;
        loop {
            if attempt > 1 {
                let delay = self.retry.backoff(attempt - 1);
                warn!(
                    payout_id = %payout_id,
                    provider = %initial.provider,
                    attempt,
                    max_attempts,
                    "Retrying payout submission after {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            let current = update_with(self.store.as_ref(), payout_id, |p| {
                if p.is_terminal() {
                    return Ok(false);
                }
                p.transition(
                    PayoutStatus::Processing,
                    "submit_attempt",
                    ACTOR,
                    &format!("attempt {}/{}", attempt, max_attempts),
                    Utc::now(),
                )?;
                p.submission_attempts += 1;
                Ok(true)
            })
            .await?;

            if current.is_terminal() {
                info!(
                    payout_id = %payout_id,
                    status = %current.status,
                    "Payout reached {} before submission; stopping",
                    current.status
                );
                return Ok(current);
            }

            self.metrics.submission_attempts.inc();
            info!(
                payout_id = %payout_id,
                provider = %current.provider,
                attempt,
                amount = %current.net_amount,
                "Submitting payout to provider"
            );

            match provider.create_payout(&current).await {
                Ok(receipt) => {
                    let mut canceled_in_flight = false;
                    let provider_id = receipt.provider_payout_id.clone();
                    let updated = update_with(self.store.as_ref(), payout_id, |p| {
                        p.provider_payout_id = Some(provider_id.clone());
                        p.updated_at = Utc::now();
                        if p.is_terminal() {
                            canceled_in_flight = p.status == PayoutStatus::Canceled;
                            return Ok(true);
                        }
                        if p.status.can_transition_to(receipt.status) {
                            p.transition(
                                receipt.status,
                                "provider_accepted",
                                ACTOR,
                                &format!("provider payout {}", provider_id),
                                Utc::now(),
                            )?;
                        } else {
                            warn!(
                                payout_id = %p.id,
                                "Ignoring provider status {} from {}",
                                receipt.status,
                                p.status
                            );
                        }
                        Ok(true)
                    })
                    .await?;

                    if canceled_in_flight {
                        warn!(
                            payout_id = %payout_id,
                            provider_payout_id = %provider_id,
                            "Payout canceled while submission was in flight; canceling upstream"
                        );
                        if let Err(e) = provider.cancel_payout(&provider_id).await {
                            warn!(payout_id = %payout_id, "Upstream cancel failed: {}", e);
                        }
                    } else if updated.status == PayoutStatus::Succeeded {
                        self.metrics.payouts_succeeded.inc();
                    }

                    info!(
                        payout_id = %payout_id,
                        provider_payout_id = %provider_id,
                        status = %updated.status,
                        attempt,
                        "Provider accepted payout"
                    );
                    return Ok(updated);
                }
                Err(e) => {
                    let message = provider_message(&e);
                    let retryable = self.retry.is_retryable(&message);

                    if retryable && attempt < max_attempts {
                        warn!(
                            payout_id = %payout_id,
                            attempt,
                            max_attempts,
                            "Retryable provider error: {}",
                            message
                        );
                        attempt += 1;
                        continue;
                    }

                    let code = if retryable {
                        FAILURE_RETRIES_EXHAUSTED
                    } else {
                        FAILURE_PROVIDER_ERROR
                    };
                    error!(
                        payout_id = %payout_id,
                        provider = %current.provider,
                        attempt,
                        code,
                        "Payout submission failed: {}",
                        message
                    );

                    let failed = update_with(self.store.as_ref(), payout_id, |p| {
                        if p.is_terminal() {
                            return Ok(false);
                        }
                        p.fail(code, &message, ACTOR, Utc::now())?;
                        Ok(true)
                    })
                    .await?;
                    if failed.status == PayoutStatus::Failed {
                        self.metrics.payouts_failed.inc();
                    }
                    return Ok(failed);
                }
            }
        }
    }

    /// Cancel locally, then best-effort upstream if the provider already has it
    pub async fn cancel(&self, payout_id: Uuid, actor: &str, reason: &str) -> Result<PayoutIntent> {
        let canceled = update_with(self.store.as_ref(), payout_id, |p| {
            p.cancel(actor, reason, Utc::now())?;
            Ok(true)
        })
        .await?;
        info!(payout_id = %payout_id, actor, "Payout canceled");

        if let Some(provider_payout_id) = &canceled.provider_payout_id {
            match self.providers.get(&canceled.provider) {
                Ok(provider) => {
                    if let Err(e) = provider.cancel_payout(provider_payout_id).await {
                        warn!(
                            payout_id = %payout_id,
                            provider_payout_id = %provider_payout_id,
                            "Upstream cancel failed: {}",
                            e
                        );
                    }
                }
                Err(e) => warn!(payout_id = %payout_id, "Upstream cancel skipped: {}", e),
            }
        }

        Ok(canceled)
    }

    async fn load(&self, payout_id: Uuid) -> Result<PayoutIntent> {
        self.store
            .get(payout_id)
            .await?
            .ok_or_else(|| payout_core::Error::PayoutNotFound(payout_id.to_string()))
    }
}
