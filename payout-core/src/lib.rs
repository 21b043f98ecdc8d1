//! Off-Ramp Payout Core
//!
//! Shared domain model for converting custodied tokens into fiat payouts.
//!
//! # Architecture
//!
//! - **State Machine**: Every status change goes through one transition table
//! - **Ports**: Providers, stores and compliance backends are traits
//! - **Optimistic Concurrency**: Intent updates compare-and-swap on `version`
//! - **Exact Money**: All amounts are `Decimal`
//!
//! # Invariants
//!
//! - `net_amount = fiat_amount - fee`
//! - One intent per idempotency key
//! - No transition out of a terminal status
//! - Audit trail is append-only

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod state;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use metrics::Metrics;
pub use ports::{
    AmlMatch, AmlProfile, AmlScreener, AmlScreening, KycGate, KycResult, LimitsStore,
    PayoutStore, Provider, RateSource, ReconciliationStore,
};
pub use state::{NewPayout, Transition};
pub use storage::{
    update_with, InMemoryLimitsStore, InMemoryPayoutStore, InMemoryReconciliationStore,
};
pub use types::{
    AccountId, AmlStatus, AuditEntry, DateRange, Destination, KycLevel, KycStatus,
    PayoutIntent, PayoutLimits, PayoutQuote, PayoutStatus, ProviderId, ProviderReceipt,
    ProviderSpeed, ReconciliationRecord, ReconciliationStatus, Resolution, SettlementReport,
    SettlementTransaction, WebhookEvent,
};
