//! Billing Invariants Module
//!
//! Provides runnable consistency checks for the ledger and billing core.
//! These invariants can be run after any mutation or sweep to ensure the
//! system is in a valid state.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real SQL query that can be run
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write
//! 4. **Complete**: Covers all critical billing consistency requirements

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Entity row(s) affected
    pub entity_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - money is being computed incorrectly
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
    /// Low - minor inconsistency, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    /// When the check was run
    pub checked_at: OffsetDateTime,
    /// Total number of checks run
    pub checks_run: usize,
    /// Number of checks that passed
    pub checks_passed: usize,
    /// Number of checks that failed
    pub checks_failed: usize,
    /// List of all violations found
    pub violations: Vec<InvariantViolation>,
    /// Overall health status
    pub healthy: bool,
}

/// Row type for multiple live subscriptions violation
#[derive(Debug, sqlx::FromRow)]
struct MultipleSubsRow {
    customer_id: Uuid,
    sub_count: i64,
}

/// Row type for wallet aggregate drift violation
#[derive(Debug, sqlx::FromRow)]
struct AggregateDriftRow {
    wallet_id: Uuid,
    stored_balance_cents: i64,
    ledger_balance_cents: i64,
}

/// Row type for paid invoice without paid_at violation
#[derive(Debug, sqlx::FromRow)]
struct PaidNoTimestampRow {
    invoice_id: Uuid,
    customer_id: Uuid,
}

/// Row type for cancelled subscription without cancelled_at violation
#[derive(Debug, sqlx::FromRow)]
struct CancelledNoTimestampRow {
    sub_id: Uuid,
    customer_id: Uuid,
}

/// Row type for monthly volume over cap violation
#[derive(Debug, sqlx::FromRow)]
struct MonthOverCapRow {
    wallet_id: Uuid,
    month: OffsetDateTime,
    volume_cents: i64,
}

/// Row type for inconsistent invoice totals violation
#[derive(Debug, sqlx::FromRow)]
struct InvoiceTotalsRow {
    invoice_id: Uuid,
    subtotal_cents: i64,
    tax_cents: i64,
    total_cents: i64,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
    monthly_cap_cents: i64,
}

impl InvariantChecker {
    pub fn new(pool: PgPool, monthly_cap_cents: i64) -> Self {
        Self {
            pool,
            monthly_cap_cents,
        }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        // Run all checks
        violations.extend(self.check_single_live_subscription().await?);
        violations.extend(self.check_wallet_aggregate_drift().await?);
        violations.extend(self.check_paid_invoices_have_paid_at().await?);
        violations.extend(self.check_cancelled_have_cancelled_at().await?);
        violations.extend(self.check_monthly_volume_within_cap().await?);
        violations.extend(self.check_invoice_totals_consistent().await?);

        let checks_run = 6;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: At most 1 live subscription per customer
    ///
    /// Multiple trial/active subscriptions would cause double-billing and
    /// break every per-customer view.
    async fn check_single_live_subscription(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<MultipleSubsRow> = sqlx::query_as(
            r#"
            SELECT customer_id, COUNT(*) as sub_count
            FROM subscriptions
            WHERE status IN ('trial', 'active')
            GROUP BY customer_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "single_live_subscription".to_string(),
                entity_ids: vec![row.customer_id],
                description: format!(
                    "Customer has {} live subscriptions (expected at most 1)",
                    row.sub_count
                ),
                context: serde_json::json!({
                    "subscription_count": row.sub_count,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: Wallet aggregates match the transaction log
    ///
    /// The stored balance must equal the full recompute from the ledger:
    /// deposits add their amount, withdrawals subtract amount plus fee.
    async fn check_wallet_aggregate_drift(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<AggregateDriftRow> = sqlx::query_as(
            r#"
            SELECT
                w.id as wallet_id,
                w.balance_cents as stored_balance_cents,
                COALESCE(SUM(CASE WHEN t.tx_type = 'deposit' THEN t.amount_cents
                                  ELSE -(t.amount_cents + t.fee_cents) END), 0)::BIGINT
                    as ledger_balance_cents
            FROM wallets w
            LEFT JOIN wallet_transactions t ON t.wallet_id = w.id
            GROUP BY w.id, w.balance_cents
            HAVING w.balance_cents <>
                COALESCE(SUM(CASE WHEN t.tx_type = 'deposit' THEN t.amount_cents
                                  ELSE -(t.amount_cents + t.fee_cents) END), 0)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "wallet_aggregate_drift".to_string(),
                entity_ids: vec![row.wallet_id],
                description: format!(
                    "Wallet balance {} cents differs from ledger recompute {} cents",
                    row.stored_balance_cents, row.ledger_balance_cents
                ),
                context: serde_json::json!({
                    "stored_balance_cents": row.stored_balance_cents,
                    "ledger_balance_cents": row.ledger_balance_cents,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 3: Paid invoices have a payment timestamp
    async fn check_paid_invoices_have_paid_at(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<PaidNoTimestampRow> = sqlx::query_as(
            r#"
            SELECT id as invoice_id, customer_id
            FROM invoices
            WHERE status = 'paid' AND paid_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "paid_invoices_have_paid_at".to_string(),
                entity_ids: vec![row.invoice_id],
                description: "Paid invoice has no paid_at timestamp".to_string(),
                context: serde_json::json!({
                    "customer_id": row.customer_id,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 4: Cancelled subscriptions have a cancellation timestamp
    async fn check_cancelled_have_cancelled_at(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<CancelledNoTimestampRow> = sqlx::query_as(
            r#"
            SELECT id as sub_id, customer_id
            FROM subscriptions
            WHERE status = 'cancelled' AND cancelled_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "cancelled_have_cancelled_at".to_string(),
                entity_ids: vec![row.sub_id],
                description: "Cancelled subscription has no cancelled_at timestamp".to_string(),
                context: serde_json::json!({
                    "customer_id": row.customer_id,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 5: No wallet-month exceeds the cap
    ///
    /// Accepted volume per wallet per calendar month must stay at or under
    /// the configured ceiling; an overshoot means the guard was bypassed.
    async fn check_monthly_volume_within_cap(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<MonthOverCapRow> = sqlx::query_as(
            r#"
            SELECT
                wallet_id,
                date_trunc('month', entry_date) as month,
                SUM(amount_cents)::BIGINT as volume_cents
            FROM wallet_transactions
            GROUP BY wallet_id, date_trunc('month', entry_date)
            HAVING SUM(amount_cents) > $1
            "#,
        )
        .bind(self.monthly_cap_cents)
        .fetch_all(&self.pool)
        .await?;

        let cap = self.monthly_cap_cents;
        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "monthly_volume_within_cap".to_string(),
                entity_ids: vec![row.wallet_id],
                description: format!(
                    "Wallet transacted {} cents in {} (cap {} cents)",
                    row.volume_cents,
                    row.month.date(),
                    cap
                ),
                context: serde_json::json!({
                    "month": row.month.to_string(),
                    "volume_cents": row.volume_cents,
                    "cap_cents": cap,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 6: Invoice totals add up
    async fn check_invoice_totals_consistent(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<InvoiceTotalsRow> = sqlx::query_as(
            r#"
            SELECT id as invoice_id, subtotal_cents, tax_cents, total_cents
            FROM invoices
            WHERE total_cents <> subtotal_cents + tax_cents
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "invoice_totals_consistent".to_string(),
                entity_ids: vec![row.invoice_id],
                description: format!(
                    "Invoice total {} cents != subtotal {} + tax {}",
                    row.total_cents, row.subtotal_cents, row.tax_cents
                ),
                context: serde_json::json!({
                    "subtotal_cents": row.subtotal_cents,
                    "tax_cents": row.tax_cents,
                    "total_cents": row.total_cents,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "single_live_subscription" => self.check_single_live_subscription().await,
            "wallet_aggregate_drift" => self.check_wallet_aggregate_drift().await,
            "paid_invoices_have_paid_at" => self.check_paid_invoices_have_paid_at().await,
            "cancelled_have_cancelled_at" => self.check_cancelled_have_cancelled_at().await,
            "monthly_volume_within_cap" => self.check_monthly_volume_within_cap().await,
            "invoice_totals_consistent" => self.check_invoice_totals_consistent().await,
            _ => Ok(vec![]),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "single_live_subscription",
            "wallet_aggregate_drift",
            "paid_invoices_have_paid_at",
            "cancelled_have_cancelled_at",
            "monthly_volume_within_cap",
            "invoice_totals_consistent",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::High.to_string(), "HIGH");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
        assert_eq!(ViolationSeverity::Low.to_string(), "LOW");
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 6);
        assert!(checks.contains(&"single_live_subscription"));
        assert!(checks.contains(&"wallet_aggregate_drift"));
    }
}
