//! Per-account payout limits

use chrono::Utc;
use dashmap::DashMap;
use payout_core::{
    config::LimitsConfig, AccountId, Error, LimitsStore, PayoutLimits, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Exclusive hold on one account's usage
///
/// Other accounts are never blocked by it.
#[derive(Debug)]
pub struct AccountGuard {
    account: AccountId,
    _lock: OwnedMutexGuard<()>,
}

impl AccountGuard {
    /// Account this guard holds
    pub fn account(&self) -> &AccountId {
        &self.account
    }
}

/// Rate limiter tracking daily/monthly usage per account
pub struct RateLimiter {
    store: Arc<dyn LimitsStore>,
    defaults: LimitsConfig,
    // Map: account -> async lock serialising check + commit
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl RateLimiter {
    /// Create new rate limiter
    pub fn new(store: Arc<dyn LimitsStore>, defaults: LimitsConfig) -> Self {
        Self {
            store,
            defaults,
            locks: DashMap::new(),
        }
    }

    /// Take the account's lock
    pub async fn acquire(&self, account: &AccountId) -> AccountGuard {
        let lock = self
            .locks
            .entry(account.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        AccountGuard {
            account: account.clone(),
            _lock: lock.lock_owned().await,
        }
    }

    /// Stored limits, or configured defaults for unseen accounts
    pub async fn get_limits(&self, account: &AccountId) -> Result<PayoutLimits> {
        if let Some(limits) = self.store.get(account).await? {
            return Ok(limits);
        }
        let now = Utc::now();
        Ok(PayoutLimits {
            account: account.clone(),
            daily_limit: self.defaults.daily_limit,
            monthly_limit: self.defaults.monthly_limit,
            per_transaction_limit: self.defaults.per_transaction_limit,
            daily_used: Decimal::ZERO,
            monthly_used: Decimal::ZERO,
            last_daily_reset: now,
            last_monthly_reset: now,
        })
    }

    /// Non-committing check
    pub async fn check(&self, account: &AccountId, amount: Decimal) -> Result<PayoutLimits> {
        let limits = self.get_limits(account).await?;
        limits.can_payout(amount)?;
        Ok(limits)
    }

    /// Add usage for the guarded account
    ///
    /// Re-validates against the ceilings so usage never exceeds them.
    pub async fn commit(&self, guard: &AccountGuard, amount: Decimal) -> Result<PayoutLimits> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "usage must be positive, got {}",
                amount
            )));
        }

        let mut limits = self.get_limits(guard.account()).await?;
        limits.can_payout(amount)?;
        limits.daily_used += amount;
        limits.monthly_used += amount;
        self.store.save(limits.clone()).await?;

        debug!(
            account = %guard.account(),
            amount = %amount,
            daily_used = %limits.daily_used,
            monthly_used = %limits.monthly_used,
            "Committed payout usage"
        );
        Ok(limits)
    }

    /// Lock, check and commit in one step
    pub async fn check_and_commit(
        &self,
        account: &AccountId,
        amount: Decimal,
    ) -> Result<PayoutLimits> {
        let guard = self.acquire(account).await;
        self.commit(&guard, amount).await
    }

    /// Zero daily usage
    pub async fn reset_daily(&self, account: &AccountId) -> Result<PayoutLimits> {
        let _guard = self.acquire(account).await;
        let mut limits = self.get_limits(account).await?;
        limits.daily_used = Decimal::ZERO;
        limits.last_daily_reset = Utc::now();
        self.store.save(limits.clone()).await?;
        info!(account = %account, "Daily usage reset");
        Ok(limits)
    }

    /// Zero monthly usage
    pub async fn reset_monthly(&self, account: &AccountId) -> Result<PayoutLimits> {
        let _guard = self.acquire(account).await;
        let mut limits = self.get_limits(account).await?;
        limits.monthly_used = Decimal::ZERO;
        limits.last_monthly_reset = Utc::now();
        self.store.save(limits.clone()).await?;
        info!(account = %account, "Monthly usage reset");
        Ok(limits)
    }

    /// Replace an account's ceilings, keeping its usage
    pub async fn set_ceilings(
        &self,
        account: &AccountId,
        daily_limit: Decimal,
        monthly_limit: Decimal,
        per_transaction_limit: Decimal,
    ) -> Result<PayoutLimits> {
        let _guard = self.acquire(account).await;
        let mut limits = self.get_limits(account).await?;
        if daily_limit < limits.daily_used || monthly_limit < limits.monthly_used {
            warn!(
                account = %account,
                "New ceilings are below current usage; remaining allowance is zero"
            );
        }
        limits.daily_limit = daily_limit;
        limits.monthly_limit = monthly_limit;
        limits.per_transaction_limit = per_transaction_limit;
        self.store.save(limits.clone()).await?;
        Ok(limits)
    }
}
