//! Scriptable in-memory provider for tests and demos

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use payout_core::{
    DateRange, Error, PayoutIntent, PayoutStatus, Provider, ProviderId, ProviderReceipt, Result,
    SettlementReport, SettlementTransaction,
};
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// In-memory payment provider with scriptable failures
pub struct MockProvider {
    id: ProviderId,
    latency_ms: u64,
    success_rate: f64,
    initial_status: PayoutStatus,
    scripted_failures: Mutex<VecDeque<String>>,
    persistent_failure: Mutex<Option<String>>,
    report_failure: Mutex<Option<String>>,
    payouts: DashMap<String, MockPayout>,
    amount_overrides: DashMap<String, Decimal>,
    omitted: DashSet<String>,
    create_calls: AtomicU32,
    cancel_calls: AtomicU32,
}

#[derive(Debug, Clone)]
struct MockPayout {
    payout_id: Uuid,
    amount: Decimal,
    currency: String,
    status: PayoutStatus,
    created_at: DateTime<Utc>,
}

impl MockProvider {
    /// Create new mock provider
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ProviderId::new(id),
            latency_ms: 0,
            success_rate: 1.0,
            initial_status: PayoutStatus::Processing,
            scripted_failures: Mutex::new(VecDeque::new()),
            persistent_failure: Mutex::new(None),
            report_failure: Mutex::new(None),
            payouts: DashMap::new(),
            amount_overrides: DashMap::new(),
            omitted: DashSet::new(),
            create_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
        }
    }

    /// Delay every call by `latency_ms`
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Fraction of submissions that succeed; the rest fail with a retryable timeout
    pub fn with_success_rate(mut self, success_rate: f64) -> Self {
        self.success_rate = success_rate.clamp(0.0, 1.0);
        self
    }

    /// Status reported for accepted payouts (instant rails settle immediately)
    pub fn with_initial_status(mut self, status: PayoutStatus) -> Self {
        self.initial_status = status;
        self
    }

    /// Fail the next submissions with these messages, in order
    pub fn fail_next<I, S>(&self, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scripted_failures
            .lock()
            .extend(messages.into_iter().map(Into::into));
    }

    /// Fail every submission until cleared with `None`
    pub fn fail_always(&self, message: Option<&str>) {
        *self.persistent_failure.lock() = message.map(String::from);
    }

    /// Fail settlement report fetches until cleared with `None`
    pub fn fail_reports(&self, message: Option<&str>) {
        *self.report_failure.lock() = message.map(String::from);
    }

    /// Move a payout to a new status (simulates the provider settling it)
    pub fn set_status(&self, provider_payout_id: &str, status: PayoutStatus) {
        if let Some(mut payout) = self.payouts.get_mut(provider_payout_id) {
            payout.status = status;
        }
    }

    /// Report a different settled amount for a payout
    pub fn settle_amount(&self, provider_payout_id: &str, amount: Decimal) {
        self.amount_overrides
            .insert(provider_payout_id.to_string(), amount);
    }

    /// Leave a payout out of settlement reports
    pub fn omit_from_report(&self, provider_payout_id: &str) {
        self.omitted.insert(provider_payout_id.to_string());
    }

    /// `create_payout` calls so far
    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// `cancel_payout` calls so far
    pub fn cancel_calls(&self) -> u32 {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    fn should_succeed(&self) -> bool {
        let mut rng = rand::thread_rng();
        rng.gen::<f64>() < self.success_rate || self.success_rate >= 1.0
    }

    fn next_failure(&self) -> Option<String> {
        if let Some(message) = self.scripted_failures.lock().pop_front() {
            return Some(message);
        }
        if let Some(message) = self.persistent_failure.lock().clone() {
            return Some(message);
        }
        if !self.should_succeed() {
            return Some("network timeout (simulated)".to_string());
        }
        None
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn create_payout(&self, intent: &PayoutIntent) -> Result<ProviderReceipt> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        info!(
            provider = %self.id,
            payout_id = %intent.id,
            amount = %intent.net_amount,
            currency = %intent.fiat_currency,
            "Mock provider: creating payout"
        );

        self.simulate_latency().await;

        if let Some(message) = self.next_failure() {
            warn!(provider = %self.id, "Mock provider: simulated failure: {}", message);
            return Err(Error::Provider(message));
        }

        let provider_payout_id = format!("{}_{}", self.id, Uuid::new_v4().simple());
        self.payouts.insert(
            provider_payout_id.clone(),
            MockPayout {
                payout_id: intent.id,
                amount: intent.net_amount,
                currency: intent.fiat_currency.clone(),
                status: self.initial_status,
                created_at: Utc::now(),
            },
        );

        Ok(ProviderReceipt {
            provider_payout_id,
            status: self.initial_status,
        })
    }

    async fn get_payout_status(&self, provider_payout_id: &str) -> Result<PayoutStatus> {
        self.simulate_latency().await;
        self.payouts
            .get(provider_payout_id)
            .map(|p| p.status)
            .ok_or_else(|| Error::Provider(format!("payout {} not found", provider_payout_id)))
    }

    async fn cancel_payout(&self, provider_payout_id: &str) -> Result<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let mut payout = self
            .payouts
            .get_mut(provider_payout_id)
            .ok_or_else(|| Error::Provider(format!("payout {} not found", provider_payout_id)))?;
        if payout.status != PayoutStatus::Processing {
            return Err(Error::Provider(format!(
                "cannot cancel payout in status {}",
                payout.status
            )));
        }
        payout.status = PayoutStatus::Canceled;
        info!(provider = %self.id, provider_payout_id, "Mock provider: payout canceled");
        Ok(())
    }

    async fn get_settlement_report(&self, range: DateRange) -> Result<SettlementReport> {
        self.simulate_latency().await;
        if let Some(message) = self.report_failure.lock().clone() {
            return Err(Error::ProviderUnavailable(message));
        }

        let mut transactions: Vec<SettlementTransaction> = self
            .payouts
            .iter()
            .filter(|p| {
                matches!(p.status, PayoutStatus::Processing | PayoutStatus::Succeeded)
                    && range.contains(p.created_at)
                    && !self.omitted.contains(p.key())
            })
            .map(|p| SettlementTransaction {
                provider_transaction_id: p.key().clone(),
                payout_id: Some(p.payout_id.to_string()),
                amount: self
                    .amount_overrides
                    .get(p.key())
                    .map(|a| *a)
                    .unwrap_or(p.amount),
                currency: p.currency.clone(),
                status: "paid".to_string(),
                processed_at: p.created_at,
            })
            .collect();
        transactions.sort_by(|a, b| a.processed_at.cmp(&b.processed_at));

        Ok(SettlementReport {
            provider: self.id.clone(),
            range,
            transactions,
        })
    }
}
