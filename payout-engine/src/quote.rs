//! Quote engine: fiat amount, fee, net amount, expiry
//!
//! Issued quotes live in an in-flight table until executed or purged.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use payout_core::{
    AccountId, Config, Error, Metrics, PayoutQuote, ProviderId, RateSource, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use usage_ledger::RateLimiter;
use uuid::Uuid;

/// Quote request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    /// Requesting account
    pub account: AccountId,
    /// Crypto amount to sell (> 0)
    pub crypto_amount: Decimal,
    /// Crypto denomination
    pub crypto_denom: String,
    /// Target fiat currency
    pub fiat_currency: String,
    /// Preferred provider
    pub preferred_provider: Option<ProviderId>,
}

/// Fiat breakdown of a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    /// Gross fiat
    pub fiat_amount: Decimal,
    /// Clamped fee
    pub fee: Decimal,
    /// fiat - fee
    pub net_amount: Decimal,
}

/// `fiat = crypto * rate`, `fee = clamp(fiat * pct, min, max)`, `net = fiat - fee`
pub fn price(
    crypto_amount: Decimal,
    rate: Decimal,
    fee_percent: Decimal,
    fee_min: Decimal,
    fee_max: Decimal,
) -> Pricing {
    let fiat_amount = (crypto_amount * rate).round_dp(2);
    let fee = (fiat_amount * fee_percent)
        .round_dp(2)
        .max(fee_min)
        .min(fee_max);
    Pricing {
        fiat_amount,
        fee,
        net_amount: fiat_amount - fee,
    }
}

/// Quote engine
pub struct QuoteEngine {
    config: Arc<Config>,
    rates: Arc<dyn RateSource>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<Metrics>,
    // Map: quote_id -> quote
    quotes: DashMap<Uuid, PayoutQuote>,
}

impl QuoteEngine {
    /// Create new quote engine
    pub fn new(
        config: Arc<Config>,
        rates: Arc<dyn RateSource>,
        limiter: Arc<RateLimiter>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            rates,
            limiter,
            metrics,
            quotes: DashMap::new(),
        }
    }

    /// Price a payout and store the quote
    pub async fn create_quote(&self, request: QuoteRequest) -> Result<PayoutQuote> {
        if request.crypto_amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "crypto amount must be positive, got {}",
                request.crypto_amount
            )));
        }

        let currency = request.fiat_currency.to_uppercase();
        let bounds = self
            .config
            .quote
            .currencies
            .get(&currency)
            .ok_or_else(|| Error::InvalidCurrency(request.fiat_currency.clone()))?;

        let provider_id = request
            .preferred_provider
            .clone()
            .unwrap_or_else(|| self.config.quote.default_provider.clone());
        let provider = self
            .config
            .provider(&provider_id)
            .ok_or_else(|| Error::ProviderNotConfigured(provider_id.to_string()))?;

        let rate = self
            .rates
            .get_rate(&request.crypto_denom, &currency)
            .await?;
        if rate <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "rate {} for {}/{} is not positive",
                rate, request.crypto_denom, currency
            )));
        }

        let pricing = price(
            request.crypto_amount,
            rate,
            self.config.quote.fee_percent,
            bounds.fee_min,
            bounds.fee_max,
        );

        if pricing.net_amount < bounds.min_payout {
            return Err(Error::PayoutAmountBelowMinimum {
                amount: pricing.net_amount,
                minimum: bounds.min_payout,
            });
        }
        if pricing.net_amount > bounds.max_payout {
            return Err(Error::PayoutAmountAboveMaximum {
                amount: pricing.net_amount,
                maximum: bounds.max_payout,
            });
        }

        // Non-committing: usage is only added after submission
        self.limiter
            .check(&request.account, pricing.net_amount)
            .await?;

        let ttl = i64::try_from(self.config.quote.ttl_seconds).map_err(|_| {
            Error::Config(format!(
                "quote.ttl_seconds out of range: {}",
                self.config.quote.ttl_seconds
            ))
        })?;

        let now = Utc::now();
        let quote = PayoutQuote {
            quote_id: Uuid::new_v4(),
            account: request.account,
            crypto_amount: request.crypto_amount,
            crypto_denom: request.crypto_denom,
            fiat_currency: currency,
            fiat_amount: pricing.fiat_amount,
            conversion_rate: rate.to_string(),
            fee: pricing.fee,
            net_amount: pricing.net_amount,
            provider: provider_id,
            estimated_arrival: now + Duration::minutes(provider.eta_minutes()),
            created_at: now,
            expires_at: now + Duration::seconds(ttl),
        };

        self.quotes.insert(quote.quote_id, quote.clone());
        self.metrics.quotes_created.inc();
        info!(
            quote_id = %quote.quote_id,
            account = %quote.account,
            provider = %quote.provider,
            net_amount = %quote.net_amount,
            currency = %quote.fiat_currency,
            "Quote created"
        );

        Ok(quote)
    }

    /// Look up an in-flight quote
    pub fn get_quote(&self, quote_id: Uuid) -> Option<PayoutQuote> {
        self.quotes.get(&quote_id).map(|q| q.clone())
    }

    /// Remove a quote only if it belongs to `account`; at most one caller gets it
    pub fn claim(&self, quote_id: Uuid, account: &AccountId) -> Option<PayoutQuote> {
        self.quotes
            .remove_if(&quote_id, |_, q| &q.account == account)
            .map(|(_, q)| q)
    }

    /// Put back a claimed quote that never produced an intent
    pub fn restore(&self, quote: PayoutQuote) {
        self.quotes.insert(quote.quote_id, quote);
    }

    /// Drop quotes expired at `now`
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.quotes.len();
        self.quotes.retain(|_, q| !q.is_expired(now));
        let purged = before.saturating_sub(self.quotes.len());
        if purged > 0 {
            debug!(purged, "Purged expired quotes");
        }
        purged
    }

    /// In-flight quote count
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    /// Check if no quotes are in flight
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

/// Rate source with fixed per-pair rates
#[derive(Debug, Default)]
pub struct FixedRateSource {
    // Map: (crypto_denom, FIAT) -> rate
    rates: DashMap<(String, String), Decimal>,
}

impl FixedRateSource {
    /// Create empty rate source
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a rate
    pub fn with_rate(self, crypto_denom: &str, fiat_currency: &str, rate: Decimal) -> Self {
        self.set_rate(crypto_denom, fiat_currency, rate);
        self
    }

    /// Set or replace a rate
    pub fn set_rate(&self, crypto_denom: &str, fiat_currency: &str, rate: Decimal) {
        self.rates.insert(
            (crypto_denom.to_string(), fiat_currency.to_uppercase()),
            rate,
        );
    }
}

#[async_trait]
impl RateSource for FixedRateSource {
    async fn get_rate(&self, crypto_denom: &str, fiat_currency: &str) -> Result<Decimal> {
        self.rates
            .get(&(crypto_denom.to_string(), fiat_currency.to_uppercase()))
            .map(|r| *r)
            .ok_or_else(|| {
                Error::InvalidCurrency(format!("no rate for {}/{}", crypto_denom, fiat_currency))
            })
    }
}
