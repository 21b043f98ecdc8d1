//! Configuration for the payout engine

use crate::types::{ProviderId, ProviderSpeed};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Payout engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Quote configuration
    pub quote: QuoteConfig,

    /// Configured providers
    pub providers: Vec<ProviderConfig>,

    /// Default account limits
    pub limits: LimitsConfig,

    /// Provider retry policy
    pub retry: RetryConfig,

    /// AML decision policy
    pub aml: AmlPolicy,

    /// Reconciliation configuration
    pub reconciliation: ReconciliationConfig,

    /// Webhook configuration
    pub webhook: WebhookConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "payout-engine".to_string(),
            quote: QuoteConfig::default(),
            providers: vec![
                ProviderConfig {
                    id: ProviderId::new("wise"),
                    speed: ProviderSpeed::BankTransfer,
                    eta_minutes: None,
                },
                ProviderConfig {
                    id: ProviderId::new("stripe_instant"),
                    speed: ProviderSpeed::Instant,
                    eta_minutes: None,
                },
            ],
            limits: LimitsConfig::default(),
            retry: RetryConfig::default(),
            aml: AmlPolicy::default(),
            reconciliation: ReconciliationConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

/// Quote configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    /// Quote validity (seconds)
    pub ttl_seconds: u64,

    /// Fee as a fraction of the fiat amount (0.01 = 1%)
    pub fee_percent: Decimal,

    /// Provider used when the caller has no preference
    pub default_provider: ProviderId,

    /// Supported fiat currencies and their bounds
    pub currencies: HashMap<String, CurrencyConfig>,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        let mut currencies = HashMap::new();
        currencies.insert(
            "USD".to_string(),
            CurrencyConfig {
                fee_min: Decimal::new(100, 2),
                fee_max: Decimal::new(5000, 2),
                min_payout: Decimal::new(10, 0),
                max_payout: Decimal::new(50_000, 0),
            },
        );
        currencies.insert(
            "EUR".to_string(),
            CurrencyConfig {
                fee_min: Decimal::new(100, 2),
                fee_max: Decimal::new(5000, 2),
                min_payout: Decimal::new(10, 0),
                max_payout: Decimal::new(50_000, 0),
            },
        );
        currencies.insert(
            "GBP".to_string(),
            CurrencyConfig {
                fee_min: Decimal::new(100, 2),
                fee_max: Decimal::new(4000, 2),
                min_payout: Decimal::new(10, 0),
                max_payout: Decimal::new(40_000, 0),
            },
        );

        Self {
            ttl_seconds: 300,                 // 5 minutes
            fee_percent: Decimal::new(1, 2),  // 1%
            default_provider: ProviderId::new("wise"),
            currencies,
        }
    }
}

/// Per-currency fee and payout bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyConfig {
    /// Minimum fee
    pub fee_min: Decimal,
    /// Maximum fee
    pub fee_max: Decimal,
    /// Minimum net payout
    pub min_payout: Decimal,
    /// Maximum net payout
    pub max_payout: Decimal,
}

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider ID
    pub id: ProviderId,

    /// Delivery speed
    pub speed: ProviderSpeed,

    /// Override for the arrival estimate (minutes)
    #[serde(default)]
    pub eta_minutes: Option<i64>,
}

impl ProviderConfig {
    /// Arrival estimate in minutes
    pub fn eta_minutes(&self) -> i64 {
        self.eta_minutes.unwrap_or(match self.speed {
            ProviderSpeed::Instant => 30,
            ProviderSpeed::BankTransfer => 3 * 24 * 60,
        })
    }
}

/// Default limits applied to accounts without stored limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Daily ceiling
    pub daily_limit: Decimal,

    /// Monthly ceiling
    pub monthly_limit: Decimal,

    /// Per-transaction ceiling
    pub per_transaction_limit: Decimal,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            daily_limit: Decimal::new(10_000, 0),
            monthly_limit: Decimal::new(100_000, 0),
            per_transaction_limit: Decimal::new(5_000, 0),
        }
    }
}

/// Provider retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total submission attempts (including the first)
    pub max_attempts: u32,

    /// Delay before the second attempt (milliseconds)
    pub initial_delay_ms: u64,

    /// Delay cap (milliseconds)
    pub max_delay_ms: u64,

    /// Error substrings that make a failure retryable (case-insensitive)
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,          // 1 second
            max_delay_ms: 30_000,             // 30 seconds
            retryable_errors: vec![
                "timeout".to_string(),
                "network".to_string(),
                "temporarily unavailable".to_string(),
                "rate limit".to_string(),
                "503".to_string(),
            ],
        }
    }
}

/// AML decision thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmlPolicy {
    /// Scores below this, with no matches, are cleared outright
    pub auto_approve_below: u8,

    /// Scores at or above this are flagged for review
    pub risk_threshold: u8,
}

impl Default for AmlPolicy {
    fn default() -> Self {
        Self {
            auto_approve_below: 30,
            risk_threshold: 70,
        }
    }
}

/// Reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Maximum tolerated absolute discrepancy
    pub discrepancy_threshold: Decimal,

    /// Resolve matched records automatically
    pub auto_resolve_matched: bool,

    /// Background run interval (seconds)
    pub interval_secs: u64,

    /// Buffer added on each side of the report date range (days)
    pub buffer_days: i64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            discrepancy_threshold: Decimal::new(100, 2), // 1.00
            auto_resolve_matched: true,
            interval_secs: 3_600,
            buffer_days: 1,
        }
    }
}

/// Webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Event-id dedup window (hours)
    pub dedup_window_hours: i64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            dedup_window_hours: 24,
        }
    }
}

/// Upper bound for `quote.ttl_seconds` (one day)
pub const MAX_QUOTE_TTL_SECONDS: u64 = 86_400;

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults with environment variable overrides
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(provider) = std::env::var("OFFRAMP_DEFAULT_PROVIDER") {
            config.quote.default_provider = ProviderId::new(provider);
        }

        if let Ok(ttl) = std::env::var("OFFRAMP_QUOTE_TTL_SECONDS") {
            config.quote.ttl_seconds = parse_env("OFFRAMP_QUOTE_TTL_SECONDS", &ttl)?;
        }

        if let Ok(fee) = std::env::var("OFFRAMP_FEE_PERCENT") {
            config.quote.fee_percent = parse_env("OFFRAMP_FEE_PERCENT", &fee)?;
        }

        if let Ok(attempts) = std::env::var("OFFRAMP_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_env("OFFRAMP_RETRY_MAX_ATTEMPTS", &attempts)?;
        }

        if let Ok(threshold) = std::env::var("OFFRAMP_RECONCILIATION_THRESHOLD") {
            config.reconciliation.discrepancy_threshold =
                parse_env("OFFRAMP_RECONCILIATION_THRESHOLD", &threshold)?;
        }

        if let Ok(interval) = std::env::var("OFFRAMP_RECONCILIATION_INTERVAL_SECS") {
            config.reconciliation.interval_secs =
                parse_env("OFFRAMP_RECONCILIATION_INTERVAL_SECS", &interval)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Look up a configured provider
    pub fn provider(&self, id: &ProviderId) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| &p.id == id)
    }

    /// Check internal consistency
    pub fn validate(&self) -> crate::Result<()> {
        if self.quote.ttl_seconds == 0 || self.quote.ttl_seconds > MAX_QUOTE_TTL_SECONDS {
            return Err(crate::Error::Config(format!(
                "quote.ttl_seconds must be in 1..={}",
                MAX_QUOTE_TTL_SECONDS
            )));
        }
        if self.quote.fee_percent < Decimal::ZERO || self.quote.fee_percent >= Decimal::ONE {
            return Err(crate::Error::Config(
                "quote.fee_percent must be in [0, 1)".into(),
            ));
        }
        if self.provider(&self.quote.default_provider).is_none() {
            return Err(crate::Error::ProviderNotConfigured(
                self.quote.default_provider.to_string(),
            ));
        }
        for (code, currency) in &self.quote.currencies {
            if currency.fee_min > currency.fee_max {
                return Err(crate::Error::Config(format!(
                    "{}: fee_min exceeds fee_max",
                    code
                )));
            }
            if currency.min_payout > currency.max_payout {
                return Err(crate::Error::Config(format!(
                    "{}: min_payout exceeds max_payout",
                    code
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(crate::Error::Config("retry.max_attempts must be >= 1".into()));
        }
        if self.aml.auto_approve_below > self.aml.risk_threshold {
            return Err(crate::Error::Config(
                "aml.auto_approve_below exceeds aml.risk_threshold".into(),
            ));
        }
        if self.reconciliation.discrepancy_threshold < Decimal::ZERO {
            return Err(crate::Error::Config(
                "reconciliation.discrepancy_threshold must be >= 0".into(),
            ));
        }
        if self.reconciliation.interval_secs == 0 {
            return Err(crate::Error::Config(
                "reconciliation.interval_secs must be > 0".into(),
            ));
        }
        if self.reconciliation.buffer_days < 0 {
            return Err(crate::Error::Config(
                "reconciliation.buffer_days must be >= 0".into(),
            ));
        }
        if self.webhook.dedup_window_hours <= 0 {
            return Err(crate::Error::Config(
                "webhook.dedup_window_hours must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> crate::Result<T> {
    value
        .parse()
        .map_err(|_| crate::Error::Config(format!("{} has invalid value '{}'", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "payout-engine");
        assert_eq!(config.quote.ttl_seconds, 300);
        assert_eq!(config.webhook.dedup_window_hours, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_eta() {
        let config = Config::default();
        let wise = config.provider(&ProviderId::new("wise")).unwrap();
        assert_eq!(wise.eta_minutes(), 4320);
        let instant = config.provider(&ProviderId::new("stripe_instant")).unwrap();
        assert_eq!(instant.eta_minutes(), 30);
    }

    #[test]
    fn test_from_file_partial_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[retry]
max_attempts = 5
initial_delay_ms = 500
max_delay_ms = 10000
retryable_errors = ["timeout"]

[reconciliation]
discrepancy_threshold = "2.50"
auto_resolve_matched = false
interval_secs = 60
buffer_days = 2
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.retryable_errors, vec!["timeout".to_string()]);
        assert_eq!(config.reconciliation.discrepancy_threshold, Decimal::new(250, 2));
        assert!(!config.reconciliation.auto_resolve_matched);
        // Untouched sections keep defaults
        assert_eq!(config.quote.ttl_seconds, 300);
    }

    #[test]
    fn test_validate_rejects_unknown_default_provider() {
        let mut config = Config::default();
        config.quote.default_provider = ProviderId::new("paypal");
        assert!(matches!(
            config.validate(),
            Err(crate::Error::ProviderNotConfigured(_))
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_fee_bounds() {
        let mut config = Config::default();
        if let Some(usd) = config.quote.currencies.get_mut("USD") {
            usd.fee_min = Decimal::new(100, 0);
        }
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_reconciliation_interval() {
        let mut config = Config::default();
        config.reconciliation.interval_secs = 0;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_negative_buffer_days() {
        let mut config = Config::default();
        config.reconciliation.buffer_days = -1;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        config.reconciliation.buffer_days = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_positive_dedup_window() {
        let mut config = Config::default();
        config.webhook.dedup_window_hours = 0;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
        config.webhook.dedup_window_hours = -24;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_validate_bounds_quote_ttl() {
        let mut config = Config::default();
        config.quote.ttl_seconds = MAX_QUOTE_TTL_SECONDS;
        assert!(config.validate().is_ok());
        config.quote.ttl_seconds = u64::MAX;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_from_file_rejects_zero_interval() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[reconciliation]
discrepancy_threshold = "1.00"
auto_resolve_matched = true
interval_secs = 0
buffer_days = 1
"#
        )
        .unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(crate::Error::Config(_))
        ));
    }
}
