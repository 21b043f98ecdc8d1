//! Provider retry policy: exponential backoff without jitter

use payout_core::{config::RetryConfig, Error};
use std::time::Duration;

/// Backoff and retryability rules for provider submissions
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    tokens: Vec<String>,
}

impl RetryPolicy {
    /// Create new retry policy
    pub fn new(config: RetryConfig) -> Self {
        let tokens = config
            .retryable_errors
            .iter()
            .map(|t| t.to_lowercase())
            .collect();
        Self { config, tokens }
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay before retry `n` (n >= 1): `min(max, initial * 2^(n-1))`
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        let delay = self
            .config
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.config.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Case-insensitive token match on the error text
    pub fn is_retryable(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.tokens.iter().any(|t| message.contains(t.as_str()))
    }
}

/// Message a provider returned, without the error-kind prefix
pub fn provider_message(error: &Error) -> String {
    match error {
        Error::Provider(msg) | Error::ProviderUnavailable(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(initial: u64, max: u64) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts: 5,
            initial_delay_ms: initial,
            max_delay_ms: max,
            retryable_errors: vec!["Timeout".into(), "503".into()],
        })
    }

    #[test]
    fn test_exponential_backoff() {
        let p = policy(1_000, 30_000);
        assert_eq!(p.backoff(1), Duration::from_millis(1_000));
        assert_eq!(p.backoff(2), Duration::from_millis(2_000));
        assert_eq!(p.backoff(3), Duration::from_millis(4_000));
    }

    #[test]
    fn test_max_delay_cap() {
        let p = policy(1_000, 5_000);
        assert_eq!(p.backoff(10), Duration::from_millis(5_000));
        // Huge exponents saturate instead of overflowing
        assert_eq!(p.backoff(200), Duration::from_millis(5_000));
    }

    #[test]
    fn test_retryable_tokens_case_insensitive() {
        let p = policy(1, 1);
        assert!(p.is_retryable("upstream TIMEOUT after 30s"));
        assert!(p.is_retryable("HTTP 503 Service Unavailable"));
        assert!(!p.is_retryable("insufficient balance"));
    }

    #[test]
    fn test_provider_message_is_verbatim() {
        assert_eq!(
            provider_message(&Error::Provider("card declined".into())),
            "card declined"
        );
        assert_eq!(
            provider_message(&Error::Storage("disk".into())),
            "Storage error: disk"
        );
    }
}
