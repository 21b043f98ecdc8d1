//! Property-based tests for payout lifecycle invariants
//!
//! - No transition leaves a terminal status
//! - `can_cancel()` is false exactly for terminal statuses
//! - Every applied transition appends exactly one audit entry
//! - Store compare-and-swap never loses an update

use chrono::Utc;
use payout_core::{
    AccountId, AmlStatus, Destination, Error, InMemoryPayoutStore, KycStatus, NewPayout,
    PayoutIntent, PayoutQuote, PayoutStatus, PayoutStore, ProviderId, Transition,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Strategy for generating valid amounts (positive decimals)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1_000u64..1_000_000_00u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

/// Strategy for generating statuses
fn status_strategy() -> impl Strategy<Value = PayoutStatus> {
    prop::sample::select(PayoutStatus::ALL.to_vec())
}

fn intent_with(amount: Decimal) -> PayoutIntent {
    let now = Utc::now();
    let fee = Decimal::ONE;
    let quote = PayoutQuote {
        quote_id: Uuid::new_v4(),
        account: AccountId::new("cosmos1holder"),
        crypto_amount: amount,
        crypto_denom: "uusdc".into(),
        fiat_currency: "USD".into(),
        fiat_amount: amount,
        conversion_rate: "1".into(),
        fee,
        net_amount: amount - fee,
        provider: ProviderId::new("wise"),
        estimated_arrival: now,
        created_at: now,
        expires_at: now,
    };
    PayoutIntent::from_quote(
        &quote,
        NewPayout {
            identity_ref: "identity".into(),
            destination: Destination::default(),
            idempotency_key: Uuid::new_v4().to_string(),
            kyc_status: KycStatus::Verified,
            aml_status: AmlStatus::Cleared,
            aml_risk_score: 0,
        },
        now,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: random transition sequences never escape a terminal status
    #[test]
    fn prop_terminal_is_absorbing(
        amount in amount_strategy(),
        steps in prop::collection::vec(status_strategy(), 1..30),
    ) {
        let mut intent = intent_with(amount);
        let mut terminal: Option<PayoutStatus> = None;

        for to in steps {
            let before_len = intent.audit_trail.len();
            let result = intent.transition(to, "step", "proptest", "", Utc::now());

            if let Some(t) = terminal {
                prop_assert_eq!(intent.status, t);
                match result {
                    Ok(Transition::Unchanged) => prop_assert_eq!(to, t),
                    Ok(Transition::Applied) => prop_assert!(false, "left terminal status"),
                    Err(e) => prop_assert!(matches!(e, Error::PayoutAlreadyProcessed(_))),
                }
                prop_assert_eq!(intent.audit_trail.len(), before_len);
            } else {
                match result {
                    Ok(Transition::Applied) => {
                        prop_assert_eq!(intent.status, to);
                        prop_assert_eq!(intent.audit_trail.len(), before_len + 1);
                    }
                    Ok(Transition::Unchanged) => prop_assert!(false, "unchanged before terminal"),
                    Err(_) => prop_assert_eq!(intent.audit_trail.len(), before_len),
                }
            }

            if intent.status.is_terminal() {
                terminal = Some(intent.status);
                prop_assert!(intent.completed_at.is_some());
            }
        }
    }

    /// Property: can_cancel is the negation of is_terminal
    #[test]
    fn prop_can_cancel_iff_not_terminal(status in status_strategy()) {
        let mut intent = intent_with(Decimal::new(10000, 2));
        intent.status = status;
        prop_assert_eq!(intent.can_cancel(), !status.is_terminal());
    }

    /// Property: net amount is carried from the quote unchanged
    #[test]
    fn prop_net_amount_carried(amount in amount_strategy()) {
        let intent = intent_with(amount);
        prop_assert_eq!(intent.net_amount, intent.fiat_amount - intent.fee);
    }
}

/// Concurrent read-modify-write with retry on conflict never loses an update
#[tokio::test]
async fn test_concurrent_cas_updates() {
    let store = Arc::new(InMemoryPayoutStore::new());
    let intent = intent_with(Decimal::new(10000, 2));
    let id = intent.id;
    store.insert(intent).await.unwrap();

    let mut handles = Vec::new();
    for worker in 0..16u32 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let mut current = store.get(id).await.unwrap().unwrap();
                current.submission_attempts += 1;
                current
                    .destination
                    .metadata
                    .insert(format!("worker-{}", worker), "seen".into());
                match store.update(current).await {
                    Ok(_) => break,
                    Err(Error::VersionConflict(_)) => tokio::task::yield_now().await,
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stored = store.get(id).await.unwrap().unwrap();
    assert_eq!(stored.submission_attempts, 16);
    assert_eq!(stored.version, 16);
    assert_eq!(stored.destination.metadata.len(), 16);
}
