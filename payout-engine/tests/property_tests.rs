// Property-based tests for quote pricing and backoff

use payout_core::config::RetryConfig;
use payout_engine::quote::price;
use payout_engine::RetryPolicy;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

// Cents in [1, 10_000_000] and rates in [0.0001, 100]
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000_000).prop_map(|r| Decimal::new(r, 4))
}

proptest! {
    #[test]
    fn prop_fee_within_bounds_and_net_consistent(
        crypto in amount_strategy(),
        rate in rate_strategy(),
        pct_bp in 0i64..500,
    ) {
        let fee_min = dec!(1.00);
        let fee_max = dec!(50.00);
        let pricing = price(crypto, rate, Decimal::new(pct_bp, 4), fee_min, fee_max);

        prop_assert!(pricing.fee >= fee_min);
        prop_assert!(pricing.fee <= fee_max);
        prop_assert_eq!(pricing.net_amount, pricing.fiat_amount - pricing.fee);
    }

    #[test]
    fn prop_backoff_monotonic_and_capped(
        initial in 1u64..5_000,
        max in 1u64..60_000,
        retry in 1u32..40,
    ) {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            initial_delay_ms: initial,
            max_delay_ms: max,
            retryable_errors: vec!["timeout".to_string()],
        });

        let delay = policy.backoff(retry);
        prop_assert!(delay <= Duration::from_millis(max));
        prop_assert!(policy.backoff(retry + 1) >= delay);
    }
}
