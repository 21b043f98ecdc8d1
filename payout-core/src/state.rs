//! Payout lifecycle state machine
//!
//! Every mutation of a [`PayoutIntent`] status goes through [`PayoutIntent::transition`]
//! (or one of its wrappers) and appends exactly one [`AuditEntry`].

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Result of applying a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status changed (or re-attempt recorded) and an audit entry was appended
    Applied,
    /// Same terminal status re-applied; nothing changed
    Unchanged,
}

impl PayoutStatus {
    /// Statuses reachable from this one
    pub fn allowed_next(&self) -> &'static [PayoutStatus] {
        use PayoutStatus::*;
        match self {
            Pending => &[KycRequired, AmlPending, Approved, OnHold, Failed, Canceled],
            KycRequired => &[AmlPending, Approved, OnHold, Failed, Canceled],
            AmlPending => &[Approved, OnHold, Failed, Canceled],
            Approved => &[Processing, OnHold, Failed, Canceled],
            OnHold => &[Approved, Failed, Canceled],
            Processing => &[Processing, Succeeded, Failed, Canceled, Reversed],
            Succeeded | Failed | Canceled | Reversed => &[],
        }
    }

    /// Check if `next` is reachable from this status
    pub fn can_transition_to(&self, next: PayoutStatus) -> bool {
        self.allowed_next().contains(&next)
    }
}

/// Inputs for creating an intent from a consumed quote
#[derive(Debug, Clone)]
pub struct NewPayout {
    /// Reference to the verified identity
    pub identity_ref: String,
    /// Payee
    pub destination: Destination,
    /// Idempotency key
    pub idempotency_key: String,
    /// KYC status observed by the gate
    pub kyc_status: KycStatus,
    /// AML status observed by the gate
    pub aml_status: AmlStatus,
    /// AML risk score observed by the gate
    pub aml_risk_score: u8,
}

impl PayoutIntent {
    /// Create a pending intent from a quote
    pub fn from_quote(quote: &PayoutQuote, new: NewPayout, now: DateTime<Utc>) -> Self {
        let mut intent = Self {
            id: Uuid::new_v4(),
            provider: quote.provider.clone(),
            status: PayoutStatus::Pending,
            account: quote.account.clone(),
            identity_ref: new.identity_ref,
            crypto_amount: quote.crypto_amount,
            crypto_denom: quote.crypto_denom.clone(),
            fiat_currency: quote.fiat_currency.clone(),
            fiat_amount: quote.fiat_amount,
            fee: quote.fee,
            net_amount: quote.net_amount,
            destination: new.destination,
            provider_payout_id: None,
            kyc_status: new.kyc_status,
            aml_status: new.aml_status,
            aml_risk_score: new.aml_risk_score,
            failure_code: None,
            failure_message: None,
            idempotency_key: new.idempotency_key,
            quote_id: quote.quote_id,
            quote_expires_at: quote.expires_at,
            submission_attempts: 0,
            reconciliation_status: None,
            reconciled_at: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 0,
            audit_trail: Vec::new(),
        };
        intent.audit_trail.push(AuditEntry {
            at: now,
            action: "created".to_string(),
            actor: "system".to_string(),
            detail: format!("from quote {}", quote.quote_id),
            status: PayoutStatus::Pending,
        });
        intent
    }

    /// Check if the intent reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Cancelable until terminal (processing included)
    pub fn can_cancel(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Apply a status transition and append an audit entry
    ///
    /// Leaving `on_hold` for `approved` is rejected here; use [`Self::release_hold`].
    pub fn transition(
        &mut self,
        to: PayoutStatus,
        action: &str,
        actor: &str,
        detail: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        if self.status == PayoutStatus::OnHold && to == PayoutStatus::Approved {
            return Err(self.invalid(to));
        }
        self.apply(to, action, actor, detail, now)
    }

    /// Manually release an AML hold back to `approved`
    pub fn release_hold(&mut self, actor: &str, notes: &str, now: DateTime<Utc>) -> Result<()> {
        if self.status != PayoutStatus::OnHold {
            return Err(self.invalid(PayoutStatus::Approved));
        }
        self.apply(PayoutStatus::Approved, "release_hold", actor, notes, now)?;
        Ok(())
    }

    /// Mark failed, recording code and message verbatim
    pub fn fail(
        &mut self,
        code: &str,
        message: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        let outcome = self.apply(PayoutStatus::Failed, "fail", actor, message, now)?;
        if outcome == Transition::Applied {
            self.failure_code = Some(code.to_string());
            self.failure_message = Some(message.to_string());
        }
        Ok(outcome)
    }

    /// Cancel a non-terminal intent
    pub fn cancel(&mut self, actor: &str, reason: &str, now: DateTime<Utc>) -> Result<()> {
        if !self.can_cancel() {
            return Err(Error::PayoutAlreadyProcessed(format!(
                "{} is {}",
                self.id, self.status
            )));
        }
        self.apply(PayoutStatus::Canceled, "cancel", actor, reason, now)?;
        Ok(())
    }

    fn apply(
        &mut self,
        to: PayoutStatus,
        action: &str,
        actor: &str,
        detail: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        if self.status.is_terminal() {
            if self.status == to {
                return Ok(Transition::Unchanged);
            }
            return Err(Error::PayoutAlreadyProcessed(format!(
                "{} is {}, cannot move to {}",
                self.id, self.status, to
            )));
        }

        if !self.status.can_transition_to(to) {
            return Err(self.invalid(to));
        }

        self.status = to;
        self.updated_at = now;
        if to.is_terminal() {
            self.completed_at = Some(now);
        }
        self.audit_trail.push(AuditEntry {
            at: now,
            action: action.to_string(),
            actor: actor.to_string(),
            detail: detail.to_string(),
            status: to,
        });
        Ok(Transition::Applied)
    }

    fn invalid(&self, to: PayoutStatus) -> Error {
        Error::InvalidTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote() -> PayoutQuote {
        let now = Utc::now();
        PayoutQuote {
            quote_id: Uuid::new_v4(),
            account: AccountId::new("cosmos1abc"),
            crypto_amount: dec!(100),
            crypto_denom: "uusdc".into(),
            fiat_currency: "USD".into(),
            fiat_amount: dec!(100),
            conversion_rate: "1.0".into(),
            fee: dec!(1),
            net_amount: dec!(99),
            provider: ProviderId::new("wise"),
            estimated_arrival: now,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(300),
        }
    }

    fn intent() -> PayoutIntent {
        PayoutIntent::from_quote(
            &quote(),
            NewPayout {
                identity_ref: "id-1".into(),
                destination: Destination::default(),
                idempotency_key: "key-1".into(),
                kyc_status: KycStatus::Verified,
                aml_status: AmlStatus::Cleared,
                aml_risk_score: 0,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_happy_path_appends_audit() {
        let mut p = intent();
        let now = Utc::now();
        p.transition(PayoutStatus::AmlPending, "kyc", "system", "", now).unwrap();
        p.transition(PayoutStatus::Approved, "aml", "system", "", now).unwrap();
        p.transition(PayoutStatus::Processing, "submit_attempt", "orchestrator", "1", now)
            .unwrap();
        p.transition(PayoutStatus::Succeeded, "webhook", "webhook:wise", "", now)
            .unwrap();

        assert_eq!(p.status, PayoutStatus::Succeeded);
        assert_eq!(p.audit_trail.len(), 5);
        assert_eq!(p.completed_at, Some(now));
        assert!(!p.can_cancel());
    }

    #[test]
    fn test_no_transition_out_of_terminal() {
        let mut p = intent();
        let now = Utc::now();
        p.fail("provider_error", "boom", "orchestrator", now).unwrap();

        let err = p
            .transition(PayoutStatus::Processing, "x", "system", "", now)
            .unwrap_err();
        assert!(matches!(err, Error::PayoutAlreadyProcessed(_)));

        let before = p.audit_trail.len();
        let outcome = p.fail("other", "again", "orchestrator", now).unwrap();
        assert_eq!(outcome, Transition::Unchanged);
        assert_eq!(p.audit_trail.len(), before);
        assert_eq!(p.failure_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_hold_needs_manual_release() {
        let mut p = intent();
        let now = Utc::now();
        p.transition(PayoutStatus::OnHold, "aml", "system", "flagged", now)
            .unwrap();

        let err = p
            .transition(PayoutStatus::Approved, "aml", "system", "", now)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        p.release_hold("ops@example.com", "false positive", now).unwrap();
        assert_eq!(p.status, PayoutStatus::Approved);
        assert_eq!(p.audit_trail.last().unwrap().actor, "ops@example.com");
    }

    #[test]
    fn test_processing_is_cancelable() {
        let mut p = intent();
        let now = Utc::now();
        p.transition(PayoutStatus::Approved, "aml", "system", "", now).unwrap();
        p.transition(PayoutStatus::Processing, "submit_attempt", "orchestrator", "1", now)
            .unwrap();
        assert!(p.can_cancel());
        p.cancel("user", "changed my mind", now).unwrap();
        assert_eq!(p.status, PayoutStatus::Canceled);
        assert!(p.cancel("user", "again", now).is_err());
    }

    #[test]
    fn test_skipping_submission_is_rejected() {
        let mut p = intent();
        let err = p
            .transition(PayoutStatus::Succeeded, "webhook", "webhook:wise", "", Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidTransition {
                from: "pending".into(),
                to: "succeeded".into()
            }
        );
    }
}
