//! In-memory reference stores
//!
//! Concurrent maps with per-key entry locking. List operations are full scans.

use crate::{
    error::{Error, Result},
    ports::{LimitsStore, PayoutStore, ReconciliationStore},
    types::*,
};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use tracing::debug;
use uuid::Uuid;

/// Conflicting writers tolerated before giving up
const MAX_CAS_RETRIES: usize = 16;

/// Read-modify-write against the stored version, retried on conflict
///
/// `f` returns `Ok(false)` to skip the write and return the freshly read copy.
pub async fn update_with<F>(store: &dyn PayoutStore, id: Uuid, mut f: F) -> Result<PayoutIntent>
where
    F: FnMut(&mut PayoutIntent) -> Result<bool> + Send,
{
    for attempt in 1..=MAX_CAS_RETRIES {
        let mut intent = store
            .get(id)
            .await?
            .ok_or_else(|| Error::PayoutNotFound(id.to_string()))?;

        if !f(&mut intent)? {
            return Ok(intent);
        }

        match store.update(intent).await {
            Ok(saved) => return Ok(saved),
            Err(Error::VersionConflict(_)) => {
                debug!(payout_id = %id, attempt, "Version conflict, re-reading");
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(e),
        }
    }

    Err(Error::VersionConflict(id.to_string()))
}

/// In-memory [`PayoutStore`]
#[derive(Debug, Default)]
pub struct InMemoryPayoutStore {
    payouts: DashMap<Uuid, PayoutIntent>,
    by_idempotency_key: DashMap<String, Uuid>,
    by_provider_id: DashMap<String, Uuid>,
}

impl InMemoryPayoutStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored intents
    pub fn len(&self) -> usize {
        self.payouts.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.payouts.is_empty()
    }

    fn lookup(&self, id: Option<Uuid>) -> Option<PayoutIntent> {
        id.and_then(|id| self.payouts.get(&id).map(|p| p.clone()))
    }
}

#[async_trait]
impl PayoutStore for InMemoryPayoutStore {
    async fn insert(&self, intent: PayoutIntent) -> Result<()> {
        match self.by_idempotency_key.entry(intent.idempotency_key.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicatePayout(intent.idempotency_key)),
            Entry::Vacant(key_slot) => match self.payouts.entry(intent.id) {
                Entry::Occupied(_) => Err(Error::Storage(format!(
                    "payout {} already exists",
                    intent.id
                ))),
                Entry::Vacant(slot) => {
                    key_slot.insert(intent.id);
                    if let Some(provider_id) = &intent.provider_payout_id {
                        self.by_provider_id.insert(provider_id.clone(), intent.id);
                    }
                    debug!(payout_id = %intent.id, "Inserted payout");
                    slot.insert(intent);
                    Ok(())
                }
            },
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<PayoutIntent>> {
        Ok(self.lookup(Some(id)))
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<PayoutIntent>> {
        let id = self.by_idempotency_key.get(key).map(|id| *id);
        Ok(self.lookup(id))
    }

    async fn get_by_provider_payout_id(
        &self,
        provider_payout_id: &str,
    ) -> Result<Option<PayoutIntent>> {
        let id = self.by_provider_id.get(provider_payout_id).map(|id| *id);
        Ok(self.lookup(id))
    }

    async fn list_by_account(&self, account: &AccountId) -> Result<Vec<PayoutIntent>> {
        let mut payouts: Vec<_> = self
            .payouts
            .iter()
            .filter(|p| &p.account == account)
            .map(|p| p.clone())
            .collect();
        payouts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payouts)
    }

    async fn list_by_status(&self, status: PayoutStatus) -> Result<Vec<PayoutIntent>> {
        Ok(self
            .payouts
            .iter()
            .filter(|p| p.status == status)
            .map(|p| p.clone())
            .collect())
    }

    async fn list_pending_reconciliation(&self) -> Result<Vec<PayoutIntent>> {
        Ok(self
            .payouts
            .iter()
            .filter(|p| {
                p.status == PayoutStatus::Succeeded
                    && p.provider_payout_id.is_some()
                    && p.reconciled_at.is_none()
            })
            .map(|p| p.clone())
            .collect())
    }

    async fn update(&self, mut intent: PayoutIntent) -> Result<PayoutIntent> {
        let mut stored = self
            .payouts
            .get_mut(&intent.id)
            .ok_or_else(|| Error::PayoutNotFound(intent.id.to_string()))?;

        if stored.version != intent.version {
            return Err(Error::VersionConflict(intent.id.to_string()));
        }
        if stored.status.is_terminal() && stored.status != intent.status {
            return Err(Error::PayoutAlreadyProcessed(format!(
                "{} is {}, cannot move to {}",
                intent.id, stored.status, intent.status
            )));
        }
        if stored.idempotency_key != intent.idempotency_key {
            return Err(Error::Storage("idempotency key is immutable".to_string()));
        }

        intent.version += 1;
        if let Some(provider_id) = &intent.provider_payout_id {
            if stored.provider_payout_id.as_ref() != Some(provider_id) {
                self.by_provider_id.insert(provider_id.clone(), intent.id);
            }
        }
        *stored = intent.clone();
        Ok(intent)
    }
}

/// In-memory [`ReconciliationStore`]
#[derive(Debug, Default)]
pub struct InMemoryReconciliationStore {
    records: DashMap<Uuid, ReconciliationRecord>,
}

impl InMemoryReconciliationStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryReconciliationStore {
    async fn upsert(&self, mut record: ReconciliationRecord) -> Result<ReconciliationRecord> {
        match self.records.entry(record.payout_id) {
            Entry::Occupied(mut existing) => {
                record.id = existing.get().id;
                record.created_at = existing.get().created_at;
                existing.insert(record.clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
        }
        Ok(record)
    }

    async fn get_by_payout_id(&self, payout_id: Uuid) -> Result<Option<ReconciliationRecord>> {
        Ok(self.records.get(&payout_id).map(|r| r.clone()))
    }

    async fn list_by_status(
        &self,
        status: ReconciliationStatus,
    ) -> Result<Vec<ReconciliationRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.clone())
            .collect())
    }
}

/// In-memory [`LimitsStore`]
#[derive(Debug, Default)]
pub struct InMemoryLimitsStore {
    limits: DashMap<AccountId, PayoutLimits>,
}

impl InMemoryLimitsStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LimitsStore for InMemoryLimitsStore {
    async fn get(&self, account: &AccountId) -> Result<Option<PayoutLimits>> {
        Ok(self.limits.get(account).map(|l| l.clone()))
    }

    async fn save(&self, limits: PayoutLimits) -> Result<()> {
        self.limits.insert(limits.account.clone(), limits);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NewPayout;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn intent(key: &str) -> PayoutIntent {
        let now = Utc::now();
        let quote = PayoutQuote {
            quote_id: Uuid::new_v4(),
            account: AccountId::new("acc-1"),
            crypto_amount: dec!(50),
            crypto_denom: "uusdc".into(),
            fiat_currency: "EUR".into(),
            fiat_amount: dec!(46),
            conversion_rate: "0.92".into(),
            fee: dec!(1),
            net_amount: dec!(45),
            provider: ProviderId::new("wise"),
            estimated_arrival: now,
            created_at: now,
            expires_at: now,
        };
        PayoutIntent::from_quote(
            &quote,
            NewPayout {
                identity_ref: "id".into(),
                destination: Destination::default(),
                idempotency_key: key.into(),
                kyc_status: KycStatus::Verified,
                aml_status: AmlStatus::Cleared,
                aml_risk_score: 0,
            },
            now,
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_key() {
        let store = InMemoryPayoutStore::new();
        store.insert(intent("k1")).await.unwrap();
        let err = store.insert(intent("k1")).await.unwrap_err();
        assert_eq!(err, Error::DuplicatePayout("k1".into()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = InMemoryPayoutStore::new();
        let p = intent("k1");
        store.insert(p.clone()).await.unwrap();

        let mut first = p.clone();
        first.provider_payout_id = Some("tr_1".into());
        let saved = store.update(first).await.unwrap();
        assert_eq!(saved.version, 1);

        // Stale copy still at version 0
        let err = store.update(p.clone()).await.unwrap_err();
        assert_eq!(err, Error::VersionConflict(p.id.to_string()));

        let found = store.get_by_provider_payout_id("tr_1").await.unwrap().unwrap();
        assert_eq!(found.id, p.id);
    }

    #[tokio::test]
    async fn test_rejects_terminal_regression() {
        let store = InMemoryPayoutStore::new();
        let mut p = intent("k1");
        p.fail("provider_error", "declined", "test", Utc::now()).unwrap();
        store.insert(p.clone()).await.unwrap();

        let mut regressed = p.clone();
        regressed.status = PayoutStatus::Processing;
        let err = store.update(regressed).await.unwrap_err();
        assert!(matches!(err, Error::PayoutAlreadyProcessed(_)));
    }

    #[tokio::test]
    async fn test_pending_reconciliation_filter() {
        let store = InMemoryPayoutStore::new();
        let mut done = intent("k1");
        done.status = PayoutStatus::Succeeded;
        done.provider_payout_id = Some("tr_1".into());
        let mut reconciled = intent("k2");
        reconciled.status = PayoutStatus::Succeeded;
        reconciled.provider_payout_id = Some("tr_2".into());
        reconciled.reconciled_at = Some(Utc::now());
        store.insert(done.clone()).await.unwrap();
        store.insert(reconciled).await.unwrap();
        store.insert(intent("k3")).await.unwrap();

        let pending = store.list_pending_reconciliation().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, done.id);
    }

    #[tokio::test]
    async fn test_update_with_skips_write() {
        let store = InMemoryPayoutStore::new();
        let p = intent("k1");
        store.insert(p.clone()).await.unwrap();

        let unchanged = update_with(&store, p.id, |_| Ok(false)).await.unwrap();
        assert_eq!(unchanged.version, 0);

        let changed = update_with(&store, p.id, |p| {
            p.submission_attempts = 2;
            Ok(true)
        })
        .await
        .unwrap();
        assert_eq!(changed.version, 1);
        assert_eq!(changed.submission_attempts, 2);

        let missing = update_with(&store, Uuid::new_v4(), |_| Ok(true)).await;
        assert!(matches!(missing, Err(Error::PayoutNotFound(_))));
    }

    #[tokio::test]
    async fn test_upsert_keeps_identity() {
        let store = InMemoryReconciliationStore::new();
        let now = Utc::now();
        let payout_id = Uuid::new_v4();
        let record = ReconciliationRecord {
            id: Uuid::new_v4(),
            payout_id,
            provider: ProviderId::new("wise"),
            provider_transaction_id: None,
            on_chain_amount: dec!(100),
            provider_amount: None,
            discrepancy: None,
            threshold: dec!(1),
            status: ReconciliationStatus::Missing,
            notes: String::new(),
            resolution: None,
            created_at: now,
            updated_at: now,
        };
        let first = store.upsert(record.clone()).await.unwrap();

        let mut again = record;
        again.id = Uuid::new_v4();
        again.status = ReconciliationStatus::Matched;
        let second = store.upsert(again).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store
                .list_by_status(ReconciliationStatus::Matched)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
