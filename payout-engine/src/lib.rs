//! Payout Engine
//!
//! Orchestrates off-ramp payouts from quote to reconciled settlement.
//!
//! # Architecture
//!
//! A payout moves through four stages:
//!
//! 1. **Quote**: Price crypto into fiat, clamp the fee, check limits
//! 2. **Execute**: Run KYC/AML once, create the intent `approved` or `on_hold`
//! 3. **Submit**: Call the provider with bounded exponential backoff
//! 4. **Settle**: Webhooks advance the intent; reconciliation compares it with
//!    the provider's settlement report
//!
//! # Example
//!
//! ```no_run
//! use payout_engine::{Collaborators, PayoutService, QuoteRequest};
//!
//! # async fn run(collaborators: Collaborators, request: QuoteRequest) -> payout_core::Result<()> {
//! let service = PayoutService::new(payout_core::Config::default(), collaborators)?;
//! let quote = service.create_quote(request).await?;
//! println!("net {} {}", quote.net_amount, quote.fiat_currency);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod orchestrator;
pub mod provider;
pub mod quote;
pub mod reconciliation;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod webhook;

// Re-exports
pub use orchestrator::SubmissionOrchestrator;
pub use provider::{MockProvider, ProviderRegistry};
pub use quote::{FixedRateSource, QuoteEngine, QuoteRequest};
pub use reconciliation::{ReconciliationEngine, ReconciliationResult};
pub use retry::RetryPolicy;
pub use scheduler::{ReconciliationScheduler, SchedulerHandle};
pub use service::{Collaborators, ExecuteRequest, HealthReport, PayoutService};
pub use webhook::{DedupCache, IngestOutcome, WebhookIngestor};
