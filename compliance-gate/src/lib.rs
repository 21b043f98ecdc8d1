//! Compliance gate for payouts
//!
//! Composes KYC verification and AML screening into a single eligibility
//! decision, plus in-memory reference collaborators.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod eligibility;
pub mod kyc;
pub mod screening;
pub mod watchlist;

pub use eligibility::{decide, AmlDecision, Eligibility, EligibilityGate};
pub use kyc::StaticKycGate;
pub use screening::WatchlistScreener;
pub use watchlist::{Watchlist, WatchlistEntry, WatchlistSource};
