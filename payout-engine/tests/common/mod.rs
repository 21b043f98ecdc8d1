// Shared harness for payout-engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use compliance_gate::{StaticKycGate, Watchlist, WatchlistScreener};
use payout_core::{
    AccountId, AmlProfile, AmlScreener, AmlScreening, AmlStatus, Config, Destination,
    InMemoryLimitsStore, InMemoryPayoutStore, InMemoryReconciliationStore, KycLevel,
    PayoutIntent, PayoutStatus, ProviderId, ReconciliationStore, Result, WebhookEvent,
};
use payout_engine::{
    Collaborators, ExecuteRequest, FixedRateSource, MockProvider, PayoutService, ProviderRegistry,
    QuoteRequest,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

pub const ACCOUNT: &str = "cosmos1payee";
pub const WISE: &str = "wise";
pub const INSTANT: &str = "stripe_instant";

pub struct Harness {
    pub service: Arc<PayoutService>,
    pub wise: Arc<MockProvider>,
    pub instant: Arc<MockProvider>,
    pub kyc: Arc<StaticKycGate>,
    pub payouts: Arc<InMemoryPayoutStore>,
}

/// Screener returning a fixed score
pub struct FixedScreener {
    pub status: AmlStatus,
    pub risk_score: u8,
}

#[async_trait]
impl AmlScreener for FixedScreener {
    async fn screen(&self, _: &AmlProfile, _: Decimal, _: &str) -> Result<AmlScreening> {
        Ok(AmlScreening {
            status: self.status,
            risk_score: self.risk_score,
            matches: Vec::new(),
        })
    }
}

pub fn fast_retry_config() -> Config {
    let mut config = Config::default();
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 4;
    config
}

pub fn harness() -> Harness {
    harness_with(fast_retry_config(), None)
}

pub fn harness_with(config: Config, aml: Option<Arc<dyn AmlScreener>>) -> Harness {
    build(config, aml, MockProvider::new(WISE), None)
}

/// Harness with a customised bank-transfer provider
pub fn harness_with_wise(wise: MockProvider) -> Harness {
    build(fast_retry_config(), None, wise, None)
}

/// Harness backed by a custom reconciliation store
pub fn harness_with_records(records: Arc<dyn ReconciliationStore>) -> Harness {
    build(fast_retry_config(), None, MockProvider::new(WISE), Some(records))
}

fn build(
    config: Config,
    aml: Option<Arc<dyn AmlScreener>>,
    wise: MockProvider,
    records: Option<Arc<dyn ReconciliationStore>>,
) -> Harness {
    let wise = Arc::new(wise);
    let instant =
        Arc::new(MockProvider::new(INSTANT).with_initial_status(PayoutStatus::Succeeded));
    let providers: ProviderRegistry = [
        wise.clone() as Arc<dyn payout_core::Provider>,
        instant.clone() as Arc<dyn payout_core::Provider>,
    ]
    .into_iter()
    .collect();

    let kyc = Arc::new(StaticKycGate::new());
    kyc.verify(AccountId::new(ACCOUNT), KycLevel::Basic);

    let aml = aml.unwrap_or_else(|| {
        let watchlist = Arc::new(Watchlist::new(0.85).unwrap());
        Arc::new(WatchlistScreener::new(watchlist, Vec::new(), 90))
    });

    let rates = FixedRateSource::new()
        .with_rate("uusdc", "USD", dec!(1))
        .with_rate("uusdc", "EUR", dec!(0.92))
        .with_rate("uusdc", "GBP", dec!(0.79));

    let payouts = Arc::new(InMemoryPayoutStore::new());
    let service = PayoutService::new(
        config,
        Collaborators {
            payouts: payouts.clone(),
            records: records.unwrap_or_else(|| Arc::new(InMemoryReconciliationStore::new())),
            limits: Arc::new(InMemoryLimitsStore::new()),
            providers,
            kyc: kyc.clone(),
            aml,
            rates: Arc::new(rates),
        },
    )
    .unwrap();

    Harness {
        service: Arc::new(service),
        wise,
        instant,
        kyc,
        payouts,
    }
}

pub fn quote_request(amount: Decimal, provider: Option<&str>) -> QuoteRequest {
    QuoteRequest {
        account: AccountId::new(ACCOUNT),
        crypto_amount: amount,
        crypto_denom: "uusdc".to_string(),
        fiat_currency: "USD".to_string(),
        preferred_provider: provider.map(ProviderId::new),
    }
}

pub fn execute_request(quote_id: Uuid) -> ExecuteRequest {
    ExecuteRequest {
        quote_id,
        account: AccountId::new(ACCOUNT),
        identity_ref: "idv_123".to_string(),
        destination: Destination {
            payee_name: "Jane Doe".to_string(),
            account_reference: "GB29NWBK60161331926819".to_string(),
            country: Some("GB".to_string()),
            ..Default::default()
        },
        idempotency_key: None,
    }
}

/// Quote and execute in one step
pub async fn pay(h: &Harness, amount: Decimal, provider: Option<&str>) -> PayoutIntent {
    let quote = h
        .service
        .create_quote(quote_request(amount, provider))
        .await
        .unwrap();
    h.service
        .execute_payout(execute_request(quote.quote_id))
        .await
        .unwrap()
}

pub fn event(event_id: &str, intent: &PayoutIntent, status: PayoutStatus) -> WebhookEvent {
    WebhookEvent {
        event_id: event_id.to_string(),
        event_type: format!("payout.{}", status),
        status,
        payout_id: None,
        provider_payout_id: intent.provider_payout_id.clone(),
        failure_code: None,
        failure_message: None,
        occurred_at: chrono::Utc::now(),
    }
}
