//! Collaborator traits
//!
//! Payment providers, persistence, identity verification, AML screening and
//! rate sourcing are injected as `Arc<dyn Trait>`.

use crate::error::Result;
use crate::types::*;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// External payment provider
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider ID
    fn id(&self) -> &ProviderId;

    /// Submit a payout for `intent.net_amount`
    async fn create_payout(&self, intent: &PayoutIntent) -> Result<ProviderReceipt>;

    /// Poll status of a submitted payout
    async fn get_payout_status(&self, provider_payout_id: &str) -> Result<PayoutStatus>;

    /// Cancel a submitted payout
    async fn cancel_payout(&self, provider_payout_id: &str) -> Result<()>;

    /// Fetch settled transactions for a date range
    async fn get_settlement_report(&self, range: DateRange) -> Result<SettlementReport>;

    /// Health check
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Payout persistence
#[async_trait]
pub trait PayoutStore: Send + Sync {
    /// Insert a new intent; unique by id and idempotency key
    async fn insert(&self, intent: PayoutIntent) -> Result<()>;

    /// Get by payout ID
    async fn get(&self, id: Uuid) -> Result<Option<PayoutIntent>>;

    /// Get by idempotency key
    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<PayoutIntent>>;

    /// Get by provider-assigned payout ID
    async fn get_by_provider_payout_id(&self, provider_payout_id: &str)
        -> Result<Option<PayoutIntent>>;

    /// All intents of an account, newest first
    async fn list_by_account(&self, account: &AccountId) -> Result<Vec<PayoutIntent>>;

    /// All intents in a status
    async fn list_by_status(&self, status: PayoutStatus) -> Result<Vec<PayoutIntent>>;

    /// Succeeded intents with a provider ID that were never reconciled
    async fn list_pending_reconciliation(&self) -> Result<Vec<PayoutIntent>>;

    /// Compare-and-swap update
    ///
    /// `intent.version` must equal the stored version. Returns the stored copy
    /// with the bumped version. Fails with `VersionConflict` on a stale read and
    /// `PayoutAlreadyProcessed` when a terminal status would be replaced.
    async fn update(&self, intent: PayoutIntent) -> Result<PayoutIntent>;

    /// Health check
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Reconciliation record persistence
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Insert or replace the record for `record.payout_id`
    ///
    /// An existing record keeps its `id` and `created_at`.
    async fn upsert(&self, record: ReconciliationRecord) -> Result<ReconciliationRecord>;

    /// Get by payout ID
    async fn get_by_payout_id(&self, payout_id: Uuid) -> Result<Option<ReconciliationRecord>>;

    /// All records in a status
    async fn list_by_status(
        &self,
        status: ReconciliationStatus,
    ) -> Result<Vec<ReconciliationRecord>>;
}

/// Usage/limits persistence
#[async_trait]
pub trait LimitsStore: Send + Sync {
    /// Get limits for an account
    async fn get(&self, account: &AccountId) -> Result<Option<PayoutLimits>>;

    /// Save limits
    async fn save(&self, limits: PayoutLimits) -> Result<()>;
}

/// KYC check result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycResult {
    /// Verification status
    pub status: KycStatus,
    /// Verification tier
    pub level: KycLevel,
}

/// Identity verification backend
#[async_trait]
pub trait KycGate: Send + Sync {
    /// Current KYC status for an account/identity pair
    async fn check_kyc_status(&self, account: &AccountId, identity_ref: &str) -> Result<KycResult>;
}

/// Subject of an AML screening
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AmlProfile {
    /// Account
    pub account: String,
    /// Identity reference
    pub identity_ref: String,
    /// Full name of the beneficiary
    pub full_name: String,
    /// Beneficiary country
    pub country: Option<String>,
    /// Document numbers, wallet addresses, IBANs
    pub identifiers: Vec<String>,
}

/// One watchlist hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmlMatch {
    /// List that produced the hit
    pub list: String,
    /// Field matched ("name", "alias", "country", "identifier")
    pub field: String,
    /// Value on the list
    pub matched_value: String,
    /// Similarity (0.0-1.0)
    pub score: f64,
}

/// Screening outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmlScreening {
    /// Screener's own verdict
    pub status: AmlStatus,
    /// Risk score (0-100)
    pub risk_score: u8,
    /// Hits
    pub matches: Vec<AmlMatch>,
}

/// AML screening backend
#[async_trait]
pub trait AmlScreener: Send + Sync {
    /// Screen a payout
    async fn screen(&self, profile: &AmlProfile, amount: Decimal, currency: &str)
        -> Result<AmlScreening>;
}

/// Conversion rate source
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Fiat units per crypto unit
    async fn get_rate(&self, crypto_denom: &str, fiat_currency: &str) -> Result<Decimal>;
}
