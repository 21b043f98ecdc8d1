//! Eligibility gate: KYC then AML, once per execution

use payout_core::{
    config::AmlPolicy, AccountId, AmlProfile, AmlScreener, AmlScreening, AmlStatus, Error,
    KycGate, KycResult, KycStatus, Metrics, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Policy outcome for a screening that was not a hard deny
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmlDecision {
    /// Proceed to `approved`
    Cleared,
    /// Create the intent `on_hold`
    ReviewRequired,
}

/// Apply the AML decision rule to a screening
///
/// A screener verdict of `Flagged` always requires review.
pub fn decide(policy: &AmlPolicy, screening: &AmlScreening) -> AmlDecision {
    let has_matches = !screening.matches.is_empty();
    if screening.status == AmlStatus::Flagged {
        AmlDecision::ReviewRequired
    } else if screening.risk_score < policy.auto_approve_below && !has_matches {
        AmlDecision::Cleared
    } else if screening.risk_score >= policy.risk_threshold || has_matches {
        AmlDecision::ReviewRequired
    } else {
        AmlDecision::Cleared
    }
}

/// Passed eligibility check
#[derive(Debug, Clone)]
pub struct Eligibility {
    /// KYC result for the account
    pub kyc: KycResult,
    /// Raw screener output
    pub screening: AmlScreening,
    /// Policy outcome
    pub decision: AmlDecision,
}

impl Eligibility {
    /// AML status to stamp on the intent
    pub fn aml_status(&self) -> AmlStatus {
        match self.decision {
            AmlDecision::Cleared => AmlStatus::Cleared,
            AmlDecision::ReviewRequired => AmlStatus::Flagged,
        }
    }

    /// Whether the intent must be created `on_hold`
    pub fn requires_hold(&self) -> bool {
        self.decision == AmlDecision::ReviewRequired
    }
}

/// Composes a [`KycGate`] and an [`AmlScreener`]
pub struct EligibilityGate {
    kyc: Arc<dyn KycGate>,
    aml: Arc<dyn AmlScreener>,
    policy: AmlPolicy,
    metrics: Arc<Metrics>,
}

impl EligibilityGate {
    /// Create new gate
    pub fn new(
        kyc: Arc<dyn KycGate>,
        aml: Arc<dyn AmlScreener>,
        policy: AmlPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            kyc,
            aml,
            policy,
            metrics,
        }
    }

    /// Run KYC then AML
    ///
    /// Denials are counted; collaborator failures surface as
    /// `ComplianceUnavailable` and are not.
    pub async fn evaluate(
        &self,
        account: &AccountId,
        identity_ref: &str,
        profile: &AmlProfile,
        amount: Decimal,
        currency: &str,
    ) -> Result<Eligibility> {
        let kyc = self
            .kyc
            .check_kyc_status(account, identity_ref)
            .await
            .map_err(|e| Error::ComplianceUnavailable(format!("kyc: {}", e)))?;

        if kyc.status != KycStatus::Verified {
            self.metrics.kyc_rejections.inc();
            warn!(account = %account, status = ?kyc.status, "KYC not verified");
            return Err(Error::KycNotVerified(format!(
                "account {} has KYC status {:?}",
                account, kyc.status
            )));
        }

        let screening = self
            .aml
            .screen(profile, amount, currency)
            .await
            .map_err(|e| Error::ComplianceUnavailable(format!("aml: {}", e)))?;

        if screening.status == AmlStatus::Rejected {
            self.metrics.aml_rejections.inc();
            warn!(
                account = %account,
                risk_score = screening.risk_score,
                "AML screening rejected payout"
            );
            return Err(Error::AmlCheckFailed(format!(
                "risk score {} with {} match(es)",
                screening.risk_score,
                screening.matches.len()
            )));
        }

        let decision = decide(&self.policy, &screening);
        if decision == AmlDecision::ReviewRequired {
            info!(
                account = %account,
                risk_score = screening.risk_score,
                matches = screening.matches.len(),
                "AML review required"
            );
        }

        Ok(Eligibility {
            kyc,
            screening,
            decision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kyc::StaticKycGate;
    use async_trait::async_trait;
    use payout_core::{AmlMatch, KycLevel};
    use rust_decimal_macros::dec;

    struct FixedScreener(Result<AmlScreening>);

    #[async_trait]
    impl AmlScreener for FixedScreener {
        async fn screen(&self, _: &AmlProfile, _: Decimal, _: &str) -> Result<AmlScreening> {
            self.0.clone()
        }
    }

    struct DownKyc;

    #[async_trait]
    impl KycGate for DownKyc {
        async fn check_kyc_status(&self, _: &AccountId, _: &str) -> Result<KycResult> {
            Err(Error::ProviderUnavailable("kyc backend timeout".into()))
        }
    }

    fn screening(status: AmlStatus, risk_score: u8, matches: usize) -> AmlScreening {
        AmlScreening {
            status,
            risk_score,
            matches: (0..matches)
                .map(|i| AmlMatch {
                    list: "OFAC".into(),
                    field: "name".into(),
                    matched_value: format!("OFAC-{}", i),
                    score: 0.9,
                })
                .collect(),
        }
    }

    fn gate(kyc: Arc<dyn KycGate>, aml: AmlScreening) -> (EligibilityGate, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new().unwrap());
        let gate = EligibilityGate::new(
            kyc,
            Arc::new(FixedScreener(Ok(aml))),
            AmlPolicy {
                auto_approve_below: 30,
                risk_threshold: 70,
            },
            metrics.clone(),
        );
        (gate, metrics)
    }

    fn verified() -> Arc<dyn KycGate> {
        let kyc = StaticKycGate::new();
        kyc.verify(AccountId::new("acc"), KycLevel::Basic);
        Arc::new(kyc)
    }

    #[test]
    fn test_decision_rule() {
        let policy = AmlPolicy {
            auto_approve_below: 30,
            risk_threshold: 70,
        };
        let d = |score, matches| decide(&policy, &screening(AmlStatus::Cleared, score, matches));
        assert_eq!(d(10, 0), AmlDecision::Cleared);
        assert_eq!(d(50, 0), AmlDecision::Cleared);
        assert_eq!(d(70, 0), AmlDecision::ReviewRequired);
        assert_eq!(d(10, 1), AmlDecision::ReviewRequired);

        // Screener verdict is not overridden by a low score
        let flagged = screening(AmlStatus::Flagged, 10, 0);
        assert_eq!(decide(&policy, &flagged), AmlDecision::ReviewRequired);
    }

    #[tokio::test]
    async fn test_unverified_kyc_denied_and_counted() {
        let (gate, metrics) = gate(
            Arc::new(StaticKycGate::new()),
            screening(AmlStatus::Cleared, 0, 0),
        );
        let err = gate
            .evaluate(&AccountId::new("acc"), "id", &AmlProfile::default(), dec!(10), "USD")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KycNotVerified(_)));
        assert_eq!(metrics.kyc_rejections.get(), 1);
    }

    #[tokio::test]
    async fn test_collaborator_failure_not_counted() {
        let (gate, metrics) = gate(Arc::new(DownKyc), screening(AmlStatus::Cleared, 0, 0));
        let err = gate
            .evaluate(&AccountId::new("acc"), "id", &AmlProfile::default(), dec!(10), "USD")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ComplianceUnavailable(_)));
        assert_eq!(metrics.kyc_rejections.get(), 0);
        assert_eq!(metrics.aml_rejections.get(), 0);
    }

    #[tokio::test]
    async fn test_rejected_screening_is_hard_deny() {
        let (gate, metrics) = gate(verified(), screening(AmlStatus::Rejected, 95, 2));
        let err = gate
            .evaluate(&AccountId::new("acc"), "id", &AmlProfile::default(), dec!(10), "USD")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AmlCheckFailed(_)));
        assert_eq!(metrics.aml_rejections.get(), 1);
    }

    #[tokio::test]
    async fn test_high_score_requires_hold() {
        let (gate, _) = gate(verified(), screening(AmlStatus::Cleared, 75, 0));
        let eligibility = gate
            .evaluate(&AccountId::new("acc"), "id", &AmlProfile::default(), dec!(10), "USD")
            .await
            .unwrap();
        assert!(eligibility.requires_hold());
        assert_eq!(eligibility.aml_status(), AmlStatus::Flagged);
    }

    #[tokio::test]
    async fn test_flagged_screening_requires_hold() {
        let (gate, metrics) = gate(verified(), screening(AmlStatus::Flagged, 50, 0));
        let eligibility = gate
            .evaluate(&AccountId::new("acc"), "id", &AmlProfile::default(), dec!(10), "USD")
            .await
            .unwrap();
        assert_eq!(eligibility.decision, AmlDecision::ReviewRequired);
        assert!(eligibility.requires_hold());
        assert_eq!(metrics.aml_rejections.get(), 0);
    }
}
