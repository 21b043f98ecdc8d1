//! Off-ramp demo: wires the payout engine in memory and walks one day of traffic

use anyhow::Context;
use chrono::Utc;
use compliance_gate::{StaticKycGate, Watchlist, WatchlistEntry, WatchlistScreener, WatchlistSource};
use payout_core::{
    AccountId, Config, Destination, InMemoryLimitsStore, InMemoryPayoutStore,
    InMemoryReconciliationStore, KycLevel, PayoutIntent, PayoutStatus, Provider, ProviderId,
    WebhookEvent,
};
use payout_engine::{
    Collaborators, ExecuteRequest, FixedRateSource, MockProvider, PayoutService, QuoteRequest,
};
use prometheus::{Encoder, TextEncoder};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{info, warn};

const ALICE: &str = "cosmos1alice";
const BORIS: &str = "cosmos1boris";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting off-ramp payout demo");

    // Load configuration: TOML file if given, environment overrides otherwise
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => Config::from_env().context("loading config from environment")?,
    };

    let wise = Arc::new(MockProvider::new("wise").with_latency_ms(50));
    let instant = Arc::new(
        MockProvider::new("stripe_instant")
            .with_latency_ms(10)
            .with_initial_status(PayoutStatus::Succeeded),
    );
    let providers = [
        wise.clone() as Arc<dyn Provider>,
        instant.clone() as Arc<dyn Provider>,
    ]
    .into_iter()
    .collect();

    let kyc = Arc::new(StaticKycGate::new());
    kyc.verify(AccountId::new(ALICE), KycLevel::Enhanced);
    kyc.verify(AccountId::new(BORIS), KycLevel::Basic);

    let watchlist = Arc::new(Watchlist::new(0.85)?);
    watchlist.load_list(
        WatchlistSource::Ofac,
        vec![WatchlistEntry {
            id: "OFAC-10452".to_string(),
            source: WatchlistSource::Ofac,
            names: vec!["Viktor Sokolov".to_string()],
            aliases: vec!["V. Sokolov".to_string()],
            countries: vec!["KP".to_string()],
            identifiers: vec![],
        }],
    );
    let screener = WatchlistScreener::new(watchlist, vec!["IR".to_string(), "SY".to_string()], 90)
        .with_high_value_threshold(dec!(10000));

    let rates = FixedRateSource::new()
        .with_rate("uusdc", "USD", dec!(1))
        .with_rate("uusdc", "EUR", dec!(0.92))
        .with_rate("uusdc", "GBP", dec!(0.79));

    let service = PayoutService::new(
        config,
        Collaborators {
            payouts: Arc::new(InMemoryPayoutStore::new()),
            records: Arc::new(InMemoryReconciliationStore::new()),
            limits: Arc::new(InMemoryLimitsStore::new()),
            providers,
            kyc,
            aml: Arc::new(screener),
            rates: Arc::new(rates),
        },
    )?;

    // 1. Bank transfer, settled by webhook
    let bank = payout(&service, ALICE, dec!(1250), "EUR", None, "Alice Martin", "DE").await?;
    let succeeded = event("evt_0001", &bank, PayoutStatus::Succeeded);
    let outcome = service
        .ingest_webhook(&ProviderId::new("wise"), succeeded.clone())
        .await?;
    info!(payout_id = %bank.id, ?outcome, "Webhook delivered");
    let outcome = service
        .ingest_webhook(&ProviderId::new("wise"), succeeded)
        .await?;
    info!(payout_id = %bank.id, ?outcome, "Webhook redelivered");

    // 2. Instant payout
    let fast = payout(
        &service,
        BORIS,
        dec!(300),
        "USD",
        Some("stripe_instant"),
        "Boris Ivanov",
        "US",
    )
    .await?;

    // 3. Watchlist hit: held, then released by compliance
    let held = payout(&service, BORIS, dec!(500), "GBP", None, "Viktor Sokolov", "GB").await?;
    if held.status == PayoutStatus::OnHold {
        let released = service
            .release_hold(held.id, "compliance@offramp", "name collision, DOB differs")
            .await?;
        info!(payout_id = %released.id, status = %released.status, "Hold released");
        if let Some(provider_payout_id) = &released.provider_payout_id {
            // Provider settles 4 GBP short
            wise.settle_amount(provider_payout_id, released.net_amount - dec!(4));
        }
        service
            .ingest_webhook(
                &ProviderId::new("wise"),
                event("evt_0002", &released, PayoutStatus::Succeeded),
            )
            .await?;
    }

    // 4. Reconcile
    let result = service.run_reconciliation().await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    for id in [bank.id, fast.id, held.id] {
        match service.get_reconciliation_record(id).await {
            Ok(record) => info!(
                payout_id = %id,
                status = %record.status,
                discrepancy = ?record.discrepancy,
                "Reconciliation record"
            ),
            Err(e) => warn!(payout_id = %id, "No reconciliation record: {}", e),
        }
    }

    // 5. Limits and health
    for account in [ALICE, BORIS] {
        let limits = service.get_limits(&AccountId::new(account)).await?;
        info!(
            account,
            daily_used = %limits.daily_used,
            daily_remaining = %limits.daily_remaining(),
            "Usage"
        );
    }

    let health = service.health_check().await;
    info!(healthy = health.healthy, components = health.components.len(), "Health check");

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&service.metrics().registry().gather(), &mut buffer)?;
    println!("{}", String::from_utf8(buffer)?);

    info!("Demo complete");
    Ok(())
}

async fn payout(
    service: &PayoutService,
    account: &str,
    amount: Decimal,
    currency: &str,
    provider: Option<&str>,
    payee: &str,
    country: &str,
) -> anyhow::Result<PayoutIntent> {
    let quote = service
        .create_quote(QuoteRequest {
            account: AccountId::new(account),
            crypto_amount: amount,
            crypto_denom: "uusdc".to_string(),
            fiat_currency: currency.to_string(),
            preferred_provider: provider.map(ProviderId::new),
        })
        .await?;
    info!(
        quote_id = %quote.quote_id,
        fiat = %quote.fiat_amount,
        fee = %quote.fee,
        net = %quote.net_amount,
        eta = %quote.estimated_arrival,
        "Quoted {} {}",
        quote.net_amount,
        quote.fiat_currency
    );

    let intent = service
        .execute_payout(ExecuteRequest {
            quote_id: quote.quote_id,
            account: AccountId::new(account),
            identity_ref: format!("idv_{}", account),
            destination: Destination {
                payee_name: payee.to_string(),
                account_reference: format!("{}-acct-0001", country),
                country: Some(country.to_string()),
                ..Default::default()
            },
            idempotency_key: None,
        })
        .await?;
    info!(
        payout_id = %intent.id,
        status = %intent.status,
        attempts = intent.submission_attempts,
        "Payout executed"
    );
    Ok(intent)
}

fn event(event_id: &str, intent: &PayoutIntent, status: PayoutStatus) -> WebhookEvent {
    WebhookEvent {
        event_id: event_id.to_string(),
        event_type: format!("transfer.{}", status),
        status,
        payout_id: Some(intent.id),
        provider_payout_id: intent.provider_payout_id.clone(),
        failure_code: None,
        failure_message: None,
        occurred_at: Utc::now(),
    }
}
