//! Usage Ledger for the payout engine
//!
//! Per-account daily/monthly usage accounting. Check and commit are atomic per
//! account: callers hold an [`AccountGuard`] across "check → submit → commit".

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod limits;

pub use limits::{AccountGuard, RateLimiter};
