//! Payout service: the single entry point callers use
//!
//! Wires the quote engine, eligibility gate, rate limiter, orchestrator,
//! webhook ingestor and reconciliation engine over shared stores.

use crate::orchestrator::SubmissionOrchestrator;
use crate::provider::ProviderRegistry;
use crate::quote::{QuoteEngine, QuoteRequest};
use crate::reconciliation::{ReconciliationEngine, ReconciliationResult};
use crate::retry::RetryPolicy;
use crate::scheduler::{ReconciliationScheduler, SchedulerHandle};
use crate::webhook::{IngestOutcome, WebhookIngestor};
use chrono::{Duration, Utc};
use compliance_gate::{Eligibility, EligibilityGate};
use payout_core::{
    update_with, AccountId, AmlProfile, AmlScreener, Config, Destination, Error, KycGate,
    LimitsStore, Metrics, NewPayout, PayoutIntent, PayoutLimits, PayoutQuote, PayoutStatus,
    PayoutStore, ProviderId, RateSource, ReconciliationRecord, ReconciliationStore, Result,
    WebhookEvent,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use usage_ledger::{AccountGuard, RateLimiter};
use uuid::Uuid;

/// Failure code when a released hold no longer fits the account's limits
pub const FAILURE_LIMIT_EXCEEDED: &str = "limit_exceeded";

const SYSTEM: &str = "system";

/// Collaborators injected into the service
pub struct Collaborators {
    /// Payout intents
    pub payouts: Arc<dyn PayoutStore>,
    /// Reconciliation records
    pub records: Arc<dyn ReconciliationStore>,
    /// Per-account limits
    pub limits: Arc<dyn LimitsStore>,
    /// Registered providers
    pub providers: ProviderRegistry,
    /// KYC backend
    pub kyc: Arc<dyn KycGate>,
    /// AML backend
    pub aml: Arc<dyn AmlScreener>,
    /// Conversion rates
    pub rates: Arc<dyn RateSource>,
}

/// Execute request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Quote to execute
    pub quote_id: Uuid,
    /// Account that requested the quote
    pub account: AccountId,
    /// Verified identity reference
    pub identity_ref: String,
    /// Payee
    pub destination: Destination,
    /// Defaults to the quote ID
    pub idempotency_key: Option<String>,
}

/// Health of one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Healthy flag
    pub healthy: bool,
    /// Error text when unhealthy
    pub detail: Option<String>,
}

/// Aggregate health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// All components healthy
    pub healthy: bool,
    /// Per-component status
    pub components: Vec<ComponentHealth>,
}

/// Payout service
pub struct PayoutService {
    config: Arc<Config>,
    payouts: Arc<dyn PayoutStore>,
    providers: Arc<ProviderRegistry>,
    quotes: QuoteEngine,
    gate: EligibilityGate,
    limiter: Arc<RateLimiter>,
    orchestrator: SubmissionOrchestrator,
    webhooks: WebhookIngestor,
    reconciliation: Arc<ReconciliationEngine>,
    metrics: Arc<Metrics>,
}

impl PayoutService {
    /// Validate the configuration and wire the components
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let config = Arc::new(config);
        let metrics = Arc::new(Metrics::new()?);
        let providers = Arc::new(collaborators.providers);
        let payouts = collaborators.payouts;

        for provider in &config.providers {
            if !providers.contains(&provider.id) {
                warn!(provider = %provider.id, "Configured provider has no registered implementation");
            }
        }

        let limiter = Arc::new(RateLimiter::new(
            collaborators.limits,
            config.limits.clone(),
        ));
        let quotes = QuoteEngine::new(
            config.clone(),
            collaborators.rates,
            limiter.clone(),
            metrics.clone(),
        );
        let gate = EligibilityGate::new(
            collaborators.kyc,
            collaborators.aml,
            config.aml.clone(),
            metrics.clone(),
        );
        let orchestrator = SubmissionOrchestrator::new(
            payouts.clone(),
            providers.clone(),
            RetryPolicy::new(config.retry.clone()),
            metrics.clone(),
        );
        let webhooks = WebhookIngestor::new(
            payouts.clone(),
            providers.clone(),
            Duration::hours(config.webhook.dedup_window_hours),
            metrics.clone(),
        );
        let reconciliation = Arc::new(ReconciliationEngine::new(
            payouts.clone(),
            collaborators.records,
            providers.clone(),
            config.reconciliation.clone(),
            metrics.clone(),
        ));

        info!(
            service = %config.service_name,
            providers = providers.iter().count(),
            "Payout service initialized"
        );

        Ok(Self {
            config,
            payouts,
            providers,
            quotes,
            gate,
            limiter,
            orchestrator,
            webhooks,
            reconciliation,
            metrics,
        })
    }

    /// Price a payout
    pub async fn create_quote(&self, request: QuoteRequest) -> Result<PayoutQuote> {
        let provider = request
            .preferred_provider
            .clone()
            .unwrap_or_else(|| self.config.quote.default_provider.clone());
        if !self.providers.contains(&provider) {
            return Err(Error::ProviderNotConfigured(provider.to_string()));
        }
        self.quotes.create_quote(request).await
    }

    /// Execute a quote
    ///
    /// Validation, compliance and quota errors are returned without creating
    /// an intent. Provider failures are recorded on the returned intent.
    pub async fn execute_payout(&self, request: ExecuteRequest) -> Result<PayoutIntent> {
        let idempotency_key = request
            .idempotency_key
            .clone()
            .unwrap_or_else(|| request.quote_id.to_string());

        if let Some(existing) = self.payouts.get_by_idempotency_key(&idempotency_key).await? {
            warn!(
                payout_id = %existing.id,
                idempotency_key = %idempotency_key,
                "Duplicate execution rejected"
            );
            return Err(Error::DuplicatePayout(idempotency_key));
        }

        // Claimed under the account guard: one quote backs at most one intent
        let guard = self.limiter.acquire(&request.account).await;
        let quote = self
            .quotes
            .claim(request.quote_id, &request.account)
            .ok_or_else(|| Error::QuoteNotFound(request.quote_id.to_string()))?;

        if quote.is_expired(Utc::now()) {
            return Err(Error::PayoutFailed(format!(
                "quote {} expired at {}",
                quote.quote_id, quote.expires_at
            )));
        }

        let intent = match self.admit(&quote, &request, idempotency_key).await {
            Ok(intent) => intent,
            Err(e) => {
                self.quotes.restore(quote);
                return Err(e);
            }
        };
        self.metrics.payouts_executed.inc();

        info!(
            payout_id = %intent.id,
            account = %intent.account,
            provider = %intent.provider,
            net_amount = %intent.net_amount,
            status = %intent.status,
            "Payout intent created"
        );

        if intent.status != PayoutStatus::Approved {
            return Ok(intent);
        }

        self.submit_and_commit(&guard, intent.id, intent.net_amount)
            .await
    }

    /// Release an AML hold and submit
    pub async fn release_hold(
        &self,
        payout_id: Uuid,
        actor: &str,
        notes: &str,
    ) -> Result<PayoutIntent> {
        let intent = self.get_payout(payout_id).await?;
        if intent.status != PayoutStatus::OnHold {
            return Err(Error::InvalidTransition {
                from: intent.status.to_string(),
                to: PayoutStatus::Approved.to_string(),
            });
        }

        let guard = self.limiter.acquire(&intent.account).await;
        if let Err(e) = self.limiter.check(&intent.account, intent.net_amount).await {
            warn!(payout_id = %payout_id, "Released hold no longer fits limits: {}", e);
            let message = e.to_string();
            update_with(self.payouts.as_ref(), payout_id, |p| {
                p.fail(FAILURE_LIMIT_EXCEEDED, &message, actor, Utc::now())?;
                Ok(true)
            })
            .await?;
            self.metrics.payouts_failed.inc();
            return Err(e);
        }

        update_with(self.payouts.as_ref(), payout_id, |p| {
            p.release_hold(actor, notes, Utc::now())?;
            Ok(true)
        })
        .await?;
        info!(payout_id = %payout_id, actor, "AML hold released");

        self.submit_and_commit(&guard, payout_id, intent.net_amount)
            .await
    }

    /// Compliance, quota and persistence for a claimed quote
    async fn admit(
        &self,
        quote: &PayoutQuote,
        request: &ExecuteRequest,
        idempotency_key: String,
    ) -> Result<PayoutIntent> {
        let profile = aml_profile(&request.account, &request.identity_ref, &request.destination);
        let eligibility = self
            .gate
            .evaluate(
                &request.account,
                &request.identity_ref,
                &profile,
                quote.net_amount,
                &quote.fiat_currency,
            )
            .await?;

        self.limiter
            .check(&request.account, quote.net_amount)
            .await?;

        let intent = build_intent(quote, request, idempotency_key, &eligibility)?;
        self.payouts.insert(intent.clone()).await?;
        if intent.status == PayoutStatus::OnHold {
            self.metrics.aml_holds.inc();
        }
        Ok(intent)
    }

    async fn submit_and_commit(
        &self,
        guard: &AccountGuard,
        payout_id: Uuid,
        amount: Decimal,
    ) -> Result<PayoutIntent> {
        let submitted = self.orchestrator.submit(payout_id).await?;
        if matches!(
            submitted.status,
            PayoutStatus::Failed | PayoutStatus::Canceled
        ) {
            return Ok(submitted);
        }

        if let Err(e) = self.limiter.commit(guard, amount).await {
            self.metrics.limit_commit_failures.inc();
            warn!(
                payout_id = %payout_id,
                account = %guard.account(),
                amount = %amount,
                "Failed to commit payout usage: {}",
                e
            );
        }
        Ok(submitted)
    }

    /// Get a payout
    pub async fn get_payout(&self, payout_id: Uuid) -> Result<PayoutIntent> {
        self.payouts
            .get(payout_id)
            .await?
            .ok_or_else(|| Error::PayoutNotFound(payout_id.to_string()))
    }

    /// Payouts for an account, newest first
    pub async fn list_payouts(&self, account: &AccountId) -> Result<Vec<PayoutIntent>> {
        let mut payouts = self.payouts.list_by_account(account).await?;
        payouts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payouts)
    }

    /// Payouts in a status
    pub async fn list_by_status(&self, status: PayoutStatus) -> Result<Vec<PayoutIntent>> {
        self.payouts.list_by_status(status).await
    }

    /// Cancel a payout
    pub async fn cancel_payout(
        &self,
        payout_id: Uuid,
        actor: &str,
        reason: &str,
    ) -> Result<PayoutIntent> {
        self.orchestrator.cancel(payout_id, actor, reason).await
    }

    /// Run the eligibility gate without executing
    pub async fn check_eligibility(
        &self,
        account: &AccountId,
        identity_ref: &str,
        destination: &Destination,
        amount: Decimal,
        currency: &str,
    ) -> Result<Eligibility> {
        let profile = aml_profile(account, identity_ref, destination);
        self.gate
            .evaluate(account, identity_ref, &profile, amount, currency)
            .await
    }

    /// Current limits and usage
    pub async fn get_limits(&self, account: &AccountId) -> Result<PayoutLimits> {
        self.limiter.get_limits(account).await
    }

    /// Rate limiter, for reset jobs
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Fold a provider event into its intent
    pub async fn ingest_webhook(
        &self,
        provider: &ProviderId,
        event: WebhookEvent,
    ) -> Result<IngestOutcome> {
        self.webhooks.ingest(provider, event).await
    }

    /// Poll the provider for a payout's status
    pub async fn refresh_status(&self, payout_id: Uuid) -> Result<IngestOutcome> {
        self.webhooks.refresh_status(payout_id).await
    }

    /// Run reconciliation once
    pub async fn run_reconciliation(&self) -> Result<ReconciliationResult> {
        self.reconciliation.run().await
    }

    /// Reconciliation record for a payout
    pub async fn get_reconciliation_record(
        &self,
        payout_id: Uuid,
    ) -> Result<ReconciliationRecord> {
        self.reconciliation.get_record(payout_id).await
    }

    /// Mark a record for manual review
    pub async fn mark_reviewing(
        &self,
        payout_id: Uuid,
        actor: &str,
        notes: &str,
    ) -> Result<ReconciliationRecord> {
        self.reconciliation
            .mark_reviewing(payout_id, actor, notes)
            .await
    }

    /// Resolve a record manually
    pub async fn resolve_reconciliation(
        &self,
        payout_id: Uuid,
        actor: &str,
        notes: &str,
    ) -> Result<ReconciliationRecord> {
        self.reconciliation.resolve(payout_id, actor, notes).await
    }

    /// Start periodic reconciliation at the configured interval
    pub fn start_reconciliation_scheduler(&self) -> SchedulerHandle {
        ReconciliationScheduler::new(
            self.reconciliation.clone(),
            std::time::Duration::from_secs(self.config.reconciliation.interval_secs),
        )
        .start()
    }

    /// Drop expired quotes
    pub fn purge_expired_quotes(&self) -> usize {
        self.quotes.purge_expired(Utc::now())
    }

    /// Check store and every registered provider
    pub async fn health_check(&self) -> HealthReport {
        let mut components = Vec::new();

        let store = self.payouts.health_check().await;
        components.push(component("payout_store", store));

        for (id, provider) in self.providers.iter() {
            let result = provider.health_check().await;
            if let Err(e) = &result {
                error!(provider = %id, "Provider health check failed: {}", e);
            }
            components.push(component(&format!("provider:{}", id), result));
        }

        HealthReport {
            healthy: components.iter().all(|c| c.healthy),
            components,
        }
    }

    /// Metrics sink
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Reconciliation engine
    pub fn reconciliation(&self) -> &Arc<ReconciliationEngine> {
        &self.reconciliation
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn component(name: &str, result: Result<()>) -> ComponentHealth {
    ComponentHealth {
        name: name.to_string(),
        healthy: result.is_ok(),
        detail: result.err().map(|e| e.to_string()),
    }
}

fn aml_profile(account: &AccountId, identity_ref: &str, destination: &Destination) -> AmlProfile {
    AmlProfile {
        account: account.to_string(),
        identity_ref: identity_ref.to_string(),
        full_name: destination.payee_name.clone(),
        country: destination.country.clone(),
        identifiers: vec![
            destination.account_reference.clone(),
            account.to_string(),
        ],
    }
}

// pending -> aml_pending -> approved | on_hold
fn build_intent(
    quote: &PayoutQuote,
    request: &ExecuteRequest,
    idempotency_key: String,
    eligibility: &Eligibility,
) -> Result<PayoutIntent> {
    let now = Utc::now();
    let mut intent = PayoutIntent::from_quote(
        quote,
        NewPayout {
            identity_ref: request.identity_ref.clone(),
            destination: request.destination.clone(),
            idempotency_key,
            kyc_status: eligibility.kyc.status,
            aml_status: eligibility.aml_status(),
            aml_risk_score: eligibility.screening.risk_score,
        },
        now,
    );

    intent.transition(
        PayoutStatus::AmlPending,
        "kyc_verified",
        SYSTEM,
        &format!("kyc level {:?}", eligibility.kyc.level),
        now,
    )?;

    let detail = format!(
        "risk score {}, {} match(es)",
        eligibility.screening.risk_score,
        eligibility.screening.matches.len()
    );
    if eligibility.requires_hold() {
        intent.transition(PayoutStatus::OnHold, "aml_review_required", SYSTEM, &detail, now)?;
    } else {
        intent.transition(PayoutStatus::Approved, "aml_cleared", SYSTEM, &detail, now)?;
    }

    Ok(intent)
}
