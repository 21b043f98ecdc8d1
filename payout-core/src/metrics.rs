//! Metrics collection for observability
//!
//! Every [`Metrics`] owns its own Prometheus registry, so independent
//! instances (one per service, one per test) never collide.
//!
//! # Metrics
//!
//! - `payout_quotes_created_total` - Quotes issued
//! - `payout_executed_total` - Intents created by execute
//! - `payout_succeeded_total` / `payout_failed_total` - Terminal outcomes
//! - `payout_submission_attempts_total` - Provider submissions
//! - `payout_kyc_rejections_total` / `payout_aml_rejections_total` / `payout_aml_holds_total`
//! - `payout_webhooks_applied_total` / `payout_webhooks_duplicate_total`
//! - `payout_reconciliation_*` - Reconciliation run outcomes
//! - `payout_limit_commit_failures_total` - Usage commits that failed after provider success
//! - `payout_reconciliation_duration_seconds` - Run duration histogram

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Quotes issued
    pub quotes_created: IntCounter,

    /// Intents created
    pub payouts_executed: IntCounter,

    /// Intents that reached `succeeded`
    pub payouts_succeeded: IntCounter,

    /// Intents that reached `failed`
    pub payouts_failed: IntCounter,

    /// Provider submissions
    pub submission_attempts: IntCounter,

    /// KYC denials
    pub kyc_rejections: IntCounter,

    /// AML hard denials
    pub aml_rejections: IntCounter,

    /// AML holds
    pub aml_holds: IntCounter,

    /// Webhook events applied
    pub webhooks_applied: IntCounter,

    /// Webhook events dropped as duplicates
    pub webhooks_duplicate: IntCounter,

    /// Reconciliation runs
    pub reconciliation_runs: IntCounter,

    /// Matched records
    pub reconciliation_matched: IntCounter,

    /// Mismatched records
    pub reconciliation_mismatched: IntCounter,

    /// Missing records
    pub reconciliation_missing: IntCounter,

    /// Provider-level reconciliation errors
    pub reconciliation_errors: IntCounter,

    /// Usage commit failures after provider success
    pub limit_commit_failures: IntCounter,

    /// Reconciliation run duration
    pub reconciliation_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector with a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let quotes_created = counter("payout_quotes_created_total", "Quotes issued")?;
        let payouts_executed = counter("payout_executed_total", "Payout intents created")?;
        let payouts_succeeded = counter("payout_succeeded_total", "Payouts succeeded")?;
        let payouts_failed = counter("payout_failed_total", "Payouts failed")?;
        let submission_attempts = counter(
            "payout_submission_attempts_total",
            "Provider submission attempts",
        )?;
        let kyc_rejections = counter("payout_kyc_rejections_total", "KYC denials")?;
        let aml_rejections = counter("payout_aml_rejections_total", "AML hard denials")?;
        let aml_holds = counter("payout_aml_holds_total", "Payouts placed on AML hold")?;
        let webhooks_applied = counter("payout_webhooks_applied_total", "Webhook events applied")?;
        let webhooks_duplicate = counter(
            "payout_webhooks_duplicate_total",
            "Webhook events dropped as duplicates",
        )?;
        let reconciliation_runs = counter(
            "payout_reconciliation_runs_total",
            "Reconciliation runs",
        )?;
        let reconciliation_matched = counter(
            "payout_reconciliation_matched_total",
            "Reconciliation records matched",
        )?;
        let reconciliation_mismatched = counter(
            "payout_reconciliation_mismatched_total",
            "Reconciliation records mismatched",
        )?;
        let reconciliation_missing = counter(
            "payout_reconciliation_missing_total",
            "Reconciliation records missing from provider reports",
        )?;
        let reconciliation_errors = counter(
            "payout_reconciliation_errors_total",
            "Provider-level reconciliation errors",
        )?;
        let limit_commit_failures = counter(
            "payout_limit_commit_failures_total",
            "Usage commits that failed after provider success",
        )?;

        let reconciliation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "payout_reconciliation_duration_seconds",
                "Reconciliation run duration",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(reconciliation_duration.clone()))?;

        Ok(Self {
            quotes_created,
            payouts_executed,
            payouts_succeeded,
            payouts_failed,
            submission_attempts,
            kyc_rejections,
            aml_rejections,
            aml_holds,
            webhooks_applied,
            webhooks_duplicate,
            reconciliation_runs,
            reconciliation_matched,
            reconciliation_mismatched,
            reconciliation_missing,
            reconciliation_errors,
            limit_commit_failures,
            reconciliation_duration,
            registry,
        })
    }

    /// Record a finished reconciliation run
    pub fn record_reconciliation(
        &self,
        matched: u64,
        mismatched: u64,
        missing: u64,
        errors: u64,
        duration_seconds: f64,
    ) {
        self.reconciliation_runs.inc();
        self.reconciliation_matched.inc_by(matched);
        self.reconciliation_mismatched.inc_by(mismatched);
        self.reconciliation_missing.inc_by(missing);
        self.reconciliation_errors.inc_by(errors);
        self.reconciliation_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
