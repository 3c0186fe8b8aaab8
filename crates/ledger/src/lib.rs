// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Brokerbooks Wallet Ledger
//!
//! Append-only transaction ledger per wallet, with the fee policy evaluator
//! and the per-calendar-month limit guard in front of every append.
//!
//! ## Features
//!
//! - **Fee Policies**: percentage / per-thousand-block / fixed, with an
//!   optional cap; unknown policy tags reject the transaction
//! - **Monthly Cap**: per-wallet calendar-month volume ceiling with
//!   clamp-to-remaining semantics
//! - **Aggregates**: balance, lifetime totals and monthly counters kept
//!   incrementally in step with the log, reconciled against a full
//!   recompute for drift detection
//! - **Seeding**: random sample-transaction back-fill for test data

pub mod aggregates;
pub mod config;
pub mod error;
pub mod fees;
pub mod limits;
pub mod seed;
pub mod wallet;

#[cfg(test)]
mod edge_case_tests;

// Aggregates
pub use aggregates::{month_anchor, next_month_anchor, LedgerEntry, WalletAggregates};

// Config
pub use config::{LedgerConfig, DEFAULT_MONTHLY_CAP_CENTS};

// Error
pub use error::{LedgerError, LedgerResult};

// Fees
pub use fees::{FeePolicy, FeeSchedule, PER_THOUSAND_BLOCK_CENTS};

// Limits
pub use limits::LimitDecision;

// Seeding
pub use seed::{seed_wallet, SeedOutcome, SeedSpec};

// Wallet
pub use wallet::{ReconcileReport, Wallet, WalletService, WalletSummary, WalletTransaction};
