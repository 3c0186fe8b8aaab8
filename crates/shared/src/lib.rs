// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Shared domain types for the brokerbooks workspace.
//!
//! Holds the closed status/type enums used by the ledger and billing crates,
//! and the audit event sink they both report mutations to.

pub mod events;
pub mod types;

pub use events::{ActorType, AuditEvent, AuditLogger};
pub use types::{
    CustomerStatus, InvoiceStatus, PackageStatus, PackageType, RenewalPolicy, SubscriptionStatus,
    TransactionType,
};
