// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Brokerbooks Billing Module
//!
//! Subscription lifecycle, invoicing and the customer account view.
//!
//! ## Features
//!
//! - **Package Catalog**: product definitions (price, duration, trial,
//!   renewal policy) consumed by the lifecycle
//! - **Subscription Lifecycle**: trial/active/expired/cancelled state
//!   machine with one-live-subscription-per-customer enforcement
//! - **Invoices**: issued alongside paid subscription events; overdue is a
//!   derived condition applied at every read
//! - **Customer View**: invoice rollups + current subscription + expiry
//!   outlook, recomputed on read
//! - **Invariants**: runnable consistency checks over the whole core

pub mod config;
pub mod customers;
pub mod error;
pub mod invariants;
pub mod invoices;
pub mod packages;
pub mod subscriptions;

#[cfg(test)]
mod edge_case_tests;

// Config
pub use config::{
    BillingConfig, DEFAULT_EXPIRING_SOON_DAYS, DEFAULT_INVOICE_DUE_DAYS, DEFAULT_TAX_RATE_BPS,
};

// Customers
pub use customers::{
    days_until_expiry, is_expiring_soon, CurrentSubscription, Customer, CustomerMetrics,
    CustomerService,
};

// Error
pub use error::{BillingError, BillingResult};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Invoices
pub use invoices::{
    compute_totals, derive_metrics, Invoice, InvoiceMetrics, InvoiceService,
};

// Packages
pub use packages::{NewPackage, Package, PackageService};

// Subscriptions
pub use subscriptions::{
    auto_renew_for, initial_terms, Subscription, SubscriptionService, SubscriptionTerms,
    SweepOutcome,
};

use brokerbooks_ledger::LedgerConfig;
use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub packages: PackageService,
    pub subscriptions: SubscriptionService,
    pub invoices: InvoiceService,
    pub customers: CustomerService,
    pub invariants: InvariantChecker,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> Self {
        Self::new(BillingConfig::from_env(), LedgerConfig::from_env(), pool)
    }

    /// Create a new billing service with explicit config
    pub fn new(config: BillingConfig, ledger_config: LedgerConfig, pool: PgPool) -> Self {
        Self {
            packages: PackageService::new(pool.clone()),
            subscriptions: SubscriptionService::new(pool.clone(), config.clone()),
            invoices: InvoiceService::new(pool.clone()),
            customers: CustomerService::new(pool.clone(), config),
            invariants: InvariantChecker::new(pool, ledger_config.monthly_cap_cents),
        }
    }
}
