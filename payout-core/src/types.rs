//! Core types for the payout engine
//!
//! All types are designed for:
//! - Exact arithmetic (Decimal for money)
//! - Plain serde serialization so any store can persist them
//! - Cheap cloning out of concurrent maps

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account identifier (wallet address of the token holder)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Payment provider identifier (e.g. "wise", "stripe_instant")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(String);

impl ProviderId {
    /// Create new provider ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// How fast a provider delivers funds; drives the quoted arrival estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSpeed {
    /// Instant-payout network (minutes)
    Instant,
    /// Bank transfer rail (days)
    BankTransfer,
}

/// Payout lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Created, nothing checked yet
    Pending,
    /// Waiting on identity verification
    KycRequired,
    /// Waiting on AML screening
    AmlPending,
    /// Cleared for submission
    Approved,
    /// AML flagged; needs manual release
    OnHold,
    /// Submitted to the provider
    Processing,
    /// Settled by the provider (terminal)
    Succeeded,
    /// Failed (terminal)
    Failed,
    /// Canceled (terminal)
    Canceled,
    /// Reversed by the provider (terminal)
    Reversed,
}

impl PayoutStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [PayoutStatus; 10] = [
        PayoutStatus::Pending,
        PayoutStatus::KycRequired,
        PayoutStatus::AmlPending,
        PayoutStatus::Approved,
        PayoutStatus::OnHold,
        PayoutStatus::Processing,
        PayoutStatus::Succeeded,
        PayoutStatus::Failed,
        PayoutStatus::Canceled,
        PayoutStatus::Reversed,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::KycRequired => "kyc_required",
            PayoutStatus::AmlPending => "aml_pending",
            PayoutStatus::Approved => "approved",
            PayoutStatus::OnHold => "on_hold",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Succeeded => "succeeded",
            PayoutStatus::Failed => "failed",
            PayoutStatus::Canceled => "canceled",
            PayoutStatus::Reversed => "reversed",
        }
    }

    /// Check if status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PayoutStatus::Succeeded
                | PayoutStatus::Failed
                | PayoutStatus::Canceled
                | PayoutStatus::Reversed
        )
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PayoutStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        PayoutStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| crate::Error::Serialization(format!("unknown payout status '{}'", s)))
    }
}

/// KYC verification status reported by the identity collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    /// Not checked yet
    NotStarted,
    /// Verification in progress
    Pending,
    /// Verified
    Verified,
    /// Verification rejected
    Rejected,
    /// Previously verified, now expired
    Expired,
}

/// KYC verification tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycLevel {
    /// No verification
    None,
    /// Basic identity document
    Basic,
    /// Enhanced due diligence
    Enhanced,
}

/// AML screening status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmlStatus {
    /// Not screened yet
    NotScreened,
    /// Clear to proceed
    Cleared,
    /// Needs manual review
    Flagged,
    /// Hard deny
    Rejected,
}

/// Provider-specific payee descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Destination {
    /// Beneficiary name as known to the provider
    pub payee_name: String,
    /// IBAN, account number, card token or payout email
    pub account_reference: String,
    /// ISO 3166 country of the beneficiary
    pub country: Option<String>,
    /// Additional provider fields
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// One entry in a payout's append-only history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the transition happened
    pub at: DateTime<Utc>,
    /// What happened (e.g. "submit_attempt", "webhook")
    pub action: String,
    /// Who did it ("system", "user", "webhook:<provider>", ...)
    pub actor: String,
    /// Free-text detail
    pub detail: String,
    /// Status after the transition
    pub status: PayoutStatus,
}

/// A priced offer to pay out; consumed at most once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutQuote {
    /// Quote ID
    pub quote_id: Uuid,
    /// Requesting account
    pub account: AccountId,
    /// Crypto amount being sold
    pub crypto_amount: Decimal,
    /// Crypto denomination (e.g. "uusdc")
    pub crypto_denom: String,
    /// Target fiat currency (ISO 4217)
    pub fiat_currency: String,
    /// Gross fiat value
    pub fiat_amount: Decimal,
    /// Conversion rate as supplied by the rate source
    pub conversion_rate: String,
    /// Fee charged
    pub fee: Decimal,
    /// Amount delivered (fiat - fee)
    pub net_amount: Decimal,
    /// Provider that will deliver the funds
    pub provider: ProviderId,
    /// Estimated delivery time
    pub estimated_arrival: DateTime<Utc>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Expiry timestamp
    pub expires_at: DateTime<Utc>,
}

impl PayoutQuote {
    /// Check if the quote is no longer executable at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// The committed unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutIntent {
    /// Payout ID
    pub id: Uuid,
    /// Provider delivering the payout
    pub provider: ProviderId,
    /// Current status
    pub status: PayoutStatus,
    /// Token holder account
    pub account: AccountId,
    /// Reference to the verified identity
    pub identity_ref: String,
    /// Crypto amount sold
    pub crypto_amount: Decimal,
    /// Crypto denomination
    pub crypto_denom: String,
    /// Fiat currency
    pub fiat_currency: String,
    /// Gross fiat value
    pub fiat_amount: Decimal,
    /// Fee charged
    pub fee: Decimal,
    /// Amount dispatched to the provider
    pub net_amount: Decimal,
    /// Payee descriptor
    pub destination: Destination,
    /// Provider-assigned ID, set once submitted
    pub provider_payout_id: Option<String>,
    /// KYC status at execution
    pub kyc_status: KycStatus,
    /// AML status at execution
    pub aml_status: AmlStatus,
    /// AML risk score at execution (0-100)
    pub aml_risk_score: u8,
    /// Failure code (provider or internal)
    pub failure_code: Option<String>,
    /// Failure message, verbatim
    pub failure_message: Option<String>,
    /// Caller-supplied idempotency key
    pub idempotency_key: String,
    /// Quote the payout was executed from
    pub quote_id: Uuid,
    /// Expiry of that quote
    pub quote_expires_at: DateTime<Utc>,
    /// Provider submissions made so far
    pub submission_attempts: u32,
    /// Latest reconciliation outcome (annotation only)
    pub reconciliation_status: Option<ReconciliationStatus>,
    /// Set once matched or manually resolved
    pub reconciled_at: Option<DateTime<Utc>>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
    /// Set on entering a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version, bumped by the store on each update
    pub version: u64,
    /// Append-only history
    pub audit_trail: Vec<AuditEntry>,
}

/// Per-account rolling usage and ceilings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutLimits {
    /// Account
    pub account: AccountId,
    /// Daily ceiling
    pub daily_limit: Decimal,
    /// Monthly ceiling
    pub monthly_limit: Decimal,
    /// Per-transaction ceiling
    pub per_transaction_limit: Decimal,
    /// Used since last daily reset
    pub daily_used: Decimal,
    /// Used since last monthly reset
    pub monthly_used: Decimal,
    /// Last daily reset
    pub last_daily_reset: DateTime<Utc>,
    /// Last monthly reset
    pub last_monthly_reset: DateTime<Utc>,
}

impl PayoutLimits {
    /// Remaining daily allowance, floored at zero
    pub fn daily_remaining(&self) -> Decimal {
        (self.daily_limit - self.daily_used).max(Decimal::ZERO)
    }

    /// Remaining monthly allowance, floored at zero
    pub fn monthly_remaining(&self) -> Decimal {
        (self.monthly_limit - self.monthly_used).max(Decimal::ZERO)
    }

    /// Check an amount against per-transaction, daily and monthly ceilings, in that order
    pub fn can_payout(&self, amount: Decimal) -> crate::Result<()> {
        if amount > self.per_transaction_limit {
            return Err(crate::Error::PayoutAmountAboveMaximum {
                amount,
                maximum: self.per_transaction_limit,
            });
        }
        let daily_remaining = self.daily_remaining();
        if amount > daily_remaining {
            return Err(crate::Error::DailyLimitExceeded {
                requested: amount,
                remaining: daily_remaining,
            });
        }
        let monthly_remaining = self.monthly_remaining();
        if amount > monthly_remaining {
            return Err(crate::Error::MonthlyLimitExceeded {
                requested: amount,
                remaining: monthly_remaining,
            });
        }
        Ok(())
    }
}

/// Outcome of comparing a payout with the provider's settlement report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    /// Within threshold
    Matched,
    /// Discrepancy above threshold
    Mismatch,
    /// No matching report entry
    Missing,
    /// Under manual review
    Reviewing,
}

impl fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReconciliationStatus::Matched => "matched",
            ReconciliationStatus::Mismatch => "mismatch",
            ReconciliationStatus::Missing => "missing",
            ReconciliationStatus::Reviewing => "reviewing",
        };
        write!(f, "{}", s)
    }
}

/// Who resolved a reconciliation record, and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// "auto" or an operator identifier
    pub resolved_by: String,
    /// When
    pub resolved_at: DateTime<Utc>,
    /// Notes
    pub notes: String,
}

/// One reconciliation result per payout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    /// Record ID
    pub id: Uuid,
    /// Payout reconciled
    pub payout_id: Uuid,
    /// Provider
    pub provider: ProviderId,
    /// Matched provider transaction, if any
    pub provider_transaction_id: Option<String>,
    /// System-recorded amount
    pub on_chain_amount: Decimal,
    /// Provider-reported amount
    pub provider_amount: Option<Decimal>,
    /// |on_chain - provider|
    pub discrepancy: Option<Decimal>,
    /// Threshold the record was judged against
    pub threshold: Decimal,
    /// Outcome
    pub status: ReconciliationStatus,
    /// Engine notes
    pub notes: String,
    /// Resolution metadata
    pub resolution: Option<Resolution>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

/// Normalized provider notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Provider event ID (dedup key)
    pub event_id: String,
    /// Provider event type (e.g. "payout.paid")
    pub event_type: String,
    /// Status mapped into the payout lifecycle
    pub status: PayoutStatus,
    /// System payout ID, if the provider echoes it
    pub payout_id: Option<Uuid>,
    /// Provider payout ID
    pub provider_payout_id: Option<String>,
    /// Failure code
    pub failure_code: Option<String>,
    /// Failure message
    pub failure_message: Option<String>,
    /// When the provider emitted it
    pub occurred_at: DateTime<Utc>,
}

/// Inclusive time range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Start (inclusive)
    pub start: DateTime<Utc>,
    /// End (inclusive)
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Check if instant is inside the range
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// One transaction in a provider settlement report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementTransaction {
    /// Provider's transaction ID
    pub provider_transaction_id: String,
    /// System payout ID, when the provider carries it
    pub payout_id: Option<String>,
    /// Settled amount
    pub amount: Decimal,
    /// Currency
    pub currency: String,
    /// Provider status string
    pub status: String,
    /// When the provider processed it
    pub processed_at: DateTime<Utc>,
}

/// Provider settlement report for a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReport {
    /// Provider
    pub provider: ProviderId,
    /// Covered range
    pub range: DateRange,
    /// Transactions
    pub transactions: Vec<SettlementTransaction>,
}

/// What a provider returns for an accepted payout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReceipt {
    /// Provider-assigned payout ID
    pub provider_payout_id: String,
    /// Status mapped into the payout lifecycle
    pub status: PayoutStatus,
}
