//! Reconciliation engine
//!
//! Compares succeeded payouts with provider settlement reports. Discrepancies
//! are recorded as data; only provider-level failures count as errors.

use crate::provider::ProviderRegistry;
use chrono::{DateTime, Duration, Utc};
use payout_core::{
    config::ReconciliationConfig, update_with, DateRange, Error, Metrics, PayoutIntent,
    PayoutStore, ProviderId, ReconciliationRecord, ReconciliationStatus, ReconciliationStore,
    Resolution, Result, SettlementReport, SettlementTransaction,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Actor recorded on automatically resolved records
pub const AUTO_RESOLVER: &str = "auto";

/// Summary of one reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// Run ID
    pub run_id: Uuid,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Intents examined
    pub processed: u64,
    /// Within threshold
    pub matched: u64,
    /// Above threshold
    pub mismatched: u64,
    /// Absent from the report
    pub missing: u64,
    /// Provider-level failures
    pub errors: u64,
    /// Wall-clock duration
    pub duration: std::time::Duration,
}

/// Compare one intent with its report entry (if any)
pub fn examine(
    intent: &PayoutIntent,
    entry: Option<&SettlementTransaction>,
    threshold: Decimal,
    now: DateTime<Utc>,
) -> ReconciliationRecord {
    let (provider_transaction_id, provider_amount, discrepancy, status, notes) = match entry {
        None => (
            None,
            None,
            None,
            ReconciliationStatus::Missing,
            "no matching transaction in settlement report".to_string(),
        ),
        Some(tx) => {
            let discrepancy = (intent.net_amount - tx.amount).abs();
            if discrepancy <= threshold {
                (
                    Some(tx.provider_transaction_id.clone()),
                    Some(tx.amount),
                    Some(discrepancy),
                    ReconciliationStatus::Matched,
                    String::new(),
                )
            } else {
                (
                    Some(tx.provider_transaction_id.clone()),
                    Some(tx.amount),
                    Some(discrepancy),
                    ReconciliationStatus::Mismatch,
                    format!(
                        "discrepancy {} exceeds threshold {} by {}",
                        discrepancy,
                        threshold,
                        discrepancy - threshold
                    ),
                )
            }
        }
    };

    ReconciliationRecord {
        id: Uuid::new_v4(),
        payout_id: intent.id,
        provider: intent.provider.clone(),
        provider_transaction_id,
        on_chain_amount: intent.net_amount,
        provider_amount,
        discrepancy,
        threshold,
        status,
        notes,
        resolution: None,
        created_at: now,
        updated_at: now,
    }
}

/// Reconciliation engine
pub struct ReconciliationEngine {
    payouts: Arc<dyn PayoutStore>,
    records: Arc<dyn ReconciliationStore>,
    providers: Arc<ProviderRegistry>,
    config: ReconciliationConfig,
    metrics: Arc<Metrics>,
}

impl ReconciliationEngine {
    /// Create new reconciliation engine
    pub fn new(
        payouts: Arc<dyn PayoutStore>,
        records: Arc<dyn ReconciliationStore>,
        providers: Arc<ProviderRegistry>,
        config: ReconciliationConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            payouts,
            records,
            providers,
            config,
            metrics,
        }
    }

    /// Reconcile every payout pending reconciliation
    pub async fn run(&self) -> Result<ReconciliationResult> {
        let started = Instant::now();
        let mut result = ReconciliationResult {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            processed: 0,
            matched: 0,
            mismatched: 0,
            missing: 0,
            errors: 0,
            duration: std::time::Duration::ZERO,
        };

        info!(run_id = %result.run_id, "Starting reconciliation run");

        let pending = self.payouts.list_pending_reconciliation().await?;
        let mut groups: BTreeMap<ProviderId, Vec<PayoutIntent>> = BTreeMap::new();
        for intent in pending {
            groups.entry(intent.provider.clone()).or_default().push(intent);
        }

        for (provider, intents) in groups {
            if let Err(e) = self.reconcile_provider(&provider, intents, &mut result).await {
                result.errors += 1;
                error!(
                    run_id = %result.run_id,
                    provider = %provider,
                    "Reconciliation failed for provider: {}",
                    e
                );
            }
        }

        result.duration = started.elapsed();
        self.metrics.record_reconciliation(
            result.matched,
            result.mismatched,
            result.missing,
            result.errors,
            result.duration.as_secs_f64(),
        );

        info!(
            run_id = %result.run_id,
            processed = result.processed,
            matched = result.matched,
            mismatched = result.mismatched,
            missing = result.missing,
            errors = result.errors,
            "Reconciliation complete in {:?}",
            result.duration
        );

        Ok(result)
    }

    async fn reconcile_provider(
        &self,
        provider_id: &ProviderId,
        intents: Vec<PayoutIntent>,
        result: &mut ReconciliationResult,
    ) -> Result<()> {
        let provider = self.providers.get(provider_id)?;
        let range = self.covering_range(&intents)?;
        let report = provider.get_settlement_report(range).await?;
        let lookup = index(&report);

        for intent in intents {
            // Manual review owns the record until it is resolved
            match self.records.get_by_payout_id(intent.id).await {
                Ok(Some(existing)) if existing.status == ReconciliationStatus::Reviewing => {
                    debug!(payout_id = %intent.id, "Record under review, skipped");
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    result.errors += 1;
                    error!(payout_id = %intent.id, "Failed to load reconciliation record: {}", e);
                    continue;
                }
            }

            let entry = intent
                .provider_payout_id
                .as_deref()
                .and_then(|id| lookup.get(id))
                .or_else(|| lookup.get(intent.id.to_string().as_str()))
                .copied();

            let record = examine(
                &intent,
                entry,
                self.config.discrepancy_threshold,
                Utc::now(),
            );

            match self.persist(&intent, record).await {
                Ok(record) => {
                    result.processed += 1;
                    match record.status {
                        ReconciliationStatus::Matched => result.matched += 1,
                        ReconciliationStatus::Mismatch => {
                            result.mismatched += 1;
                            warn!(
                                payout_id = %intent.id,
                                provider = %provider_id,
                                "Reconciliation mismatch: {}",
                                record.notes
                            );
                        }
                        ReconciliationStatus::Missing => {
                            result.missing += 1;
                            warn!(
                                payout_id = %intent.id,
                                provider = %provider_id,
                                "Payout missing from settlement report"
                            );
                        }
                        ReconciliationStatus::Reviewing => {}
                    }
                }
                Err(e) => {
                    // Counted; the rest of the group still runs
                    result.errors += 1;
                    error!(payout_id = %intent.id, "Failed to persist reconciliation: {}", e);
                }
            }
        }

        Ok(())
    }

    fn covering_range(&self, intents: &[PayoutIntent]) -> Result<DateRange> {
        let start = intents.iter().map(|i| i.created_at).min();
        let end = intents.iter().map(|i| i.created_at).max();
        match (start, end) {
            (Some(start), Some(end)) => {
                let buffer = Duration::days(self.config.buffer_days);
                Ok(DateRange {
                    start: start - buffer,
                    end: end + buffer,
                })
            }
            _ => Err(Error::Storage("empty reconciliation group".to_string())),
        }
    }

    async fn persist(
        &self,
        intent: &PayoutIntent,
        mut record: ReconciliationRecord,
    ) -> Result<ReconciliationRecord> {
        let matched = record.status == ReconciliationStatus::Matched;
        if matched && self.config.auto_resolve_matched {
            record.resolution = Some(Resolution {
                resolved_by: AUTO_RESOLVER.to_string(),
                resolved_at: record.updated_at,
                notes: "within threshold".to_string(),
            });
        }

        let record = self.records.upsert(record).await?;
        let status = record.status;
        let at = record.updated_at;
        update_with(self.payouts.as_ref(), intent.id, |p| {
            p.reconciliation_status = Some(status);
            if matched {
                p.reconciled_at = Some(at);
            }
            Ok(true)
        })
        .await?;

        Ok(record)
    }

    /// Get the record for a payout
    pub async fn get_record(&self, payout_id: Uuid) -> Result<ReconciliationRecord> {
        self.records
            .get_by_payout_id(payout_id)
            .await?
            .ok_or_else(|| Error::RecordNotFound(payout_id.to_string()))
    }

    /// Put a record under manual review
    pub async fn mark_reviewing(
        &self,
        payout_id: Uuid,
        actor: &str,
        notes: &str,
    ) -> Result<ReconciliationRecord> {
        let mut record = self.get_record(payout_id).await?;
        record.status = ReconciliationStatus::Reviewing;
        record.notes = append_note(&record.notes, actor, notes);
        record.updated_at = Utc::now();
        let record = self.records.upsert(record).await?;

        update_with(self.payouts.as_ref(), payout_id, |p| {
            p.reconciliation_status = Some(ReconciliationStatus::Reviewing);
            Ok(true)
        })
        .await?;

        info!(payout_id = %payout_id, actor, "Reconciliation record under review");
        Ok(record)
    }

    /// Resolve a record manually; the payout is no longer re-examined
    pub async fn resolve(
        &self,
        payout_id: Uuid,
        actor: &str,
        notes: &str,
    ) -> Result<ReconciliationRecord> {
        let mut record = self.get_record(payout_id).await?;
        let now = Utc::now();
        record.resolution = Some(Resolution {
            resolved_by: actor.to_string(),
            resolved_at: now,
            notes: notes.to_string(),
        });
        record.updated_at = now;
        let record = self.records.upsert(record).await?;

        let status = record.status;
        update_with(self.payouts.as_ref(), payout_id, |p| {
            p.reconciliation_status = Some(status);
            p.reconciled_at = Some(now);
            Ok(true)
        })
        .await?;

        info!(payout_id = %payout_id, actor, status = %status, "Reconciliation record resolved");
        Ok(record)
    }

    /// Records in a status
    pub async fn list_records(
        &self,
        status: ReconciliationStatus,
    ) -> Result<Vec<ReconciliationRecord>> {
        self.records.list_by_status(status).await
    }
}

// Keyed by provider transaction ID and, when carried, by payout ID
fn index(report: &SettlementReport) -> HashMap<&str, &SettlementTransaction> {
    let mut lookup = HashMap::with_capacity(report.transactions.len() * 2);
    for tx in &report.transactions {
        lookup.insert(tx.provider_transaction_id.as_str(), tx);
        if let Some(payout_id) = &tx.payout_id {
            lookup.insert(payout_id.as_str(), tx);
        }
    }
    lookup
}

fn append_note(existing: &str, actor: &str, notes: &str) -> String {
    if existing.is_empty() {
        format!("[{}] {}", actor, notes)
    } else {
        format!("{}\n[{}] {}", existing, actor, notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payout_core::{
        AccountId, AmlStatus, Destination, KycStatus, NewPayout, PayoutQuote,
    };
    use rust_decimal_macros::dec;

    fn intent(net: Decimal) -> PayoutIntent {
        let now = Utc::now();
        let quote = PayoutQuote {
            quote_id: Uuid::new_v4(),
            account: AccountId::new("acc"),
            crypto_amount: net,
            crypto_denom: "uusdc".into(),
            fiat_currency: "USD".into(),
            fiat_amount: net,
            conversion_rate: "1".into(),
            fee: Decimal::ZERO,
            net_amount: net,
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
                idempotency_key: Uuid::new_v4().to_string(),
                kyc_status: KycStatus::Verified,
                aml_status: AmlStatus::Cleared,
                aml_risk_score: 0,
            },
            now,
        )
    }

    fn tx(amount: Decimal) -> SettlementTransaction {
        SettlementTransaction {
            provider_transaction_id: "tr_1".into(),
            payout_id: None,
            amount,
            currency: "USD".into(),
            status: "paid".into(),
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn test_exact_match() {
        let record = examine(&intent(dec!(10000)), Some(&tx(dec!(10000))), dec!(100), Utc::now());
        assert_eq!(record.status, ReconciliationStatus::Matched);
        assert_eq!(record.discrepancy, Some(Decimal::ZERO));
    }

    #[test]
    fn test_mismatch_above_threshold() {
        let record = examine(&intent(dec!(10000)), Some(&tx(dec!(9850))), dec!(100), Utc::now());
        assert_eq!(record.status, ReconciliationStatus::Mismatch);
        assert_eq!(record.discrepancy, Some(dec!(150)));
        assert_eq!(record.notes, "discrepancy 150 exceeds threshold 100 by 50");
    }

    #[test]
    fn test_discrepancy_at_threshold_matches() {
        let record = examine(&intent(dec!(10000)), Some(&tx(dec!(10100))), dec!(100), Utc::now());
        assert_eq!(record.status, ReconciliationStatus::Matched);
    }

    #[test]
    fn test_missing() {
        let record = examine(&intent(dec!(10000)), None, dec!(100), Utc::now());
        assert_eq!(record.status, ReconciliationStatus::Missing);
        assert_eq!(record.provider_amount, None);
        assert_eq!(record.discrepancy, None);
    }

    #[test]
    fn test_index_by_both_keys() {
        let mut t = tx(dec!(5));
        t.payout_id = Some("payout-1".into());
        let report = SettlementReport {
            provider: ProviderId::new("wise"),
            range: DateRange {
                start: Utc::now(),
                end: Utc::now(),
            },
            transactions: vec![t],
        };
        let lookup = index(&report);
        assert!(lookup.contains_key("tr_1"));
        assert!(lookup.contains_key("payout-1"));
    }
}
