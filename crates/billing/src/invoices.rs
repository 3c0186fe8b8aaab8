//! Invoice ledger.
//!
//! Billing documents derived from subscription events. Status machine:
//! pending -> paid, pending -> overdue -> paid; paid is terminal. Overdue is
//! a derived condition — a pending invoice past its due date — and every
//! aggregation applies the derivation instead of trusting the stored
//! column. The worker may materialize `overdue` for indexing, but reads
//! never require it.

use brokerbooks_shared::{ActorType, AuditEvent, AuditLogger, InvoiceStatus};
use serde::Serialize;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::{BillingError, BillingResult};

const INVOICE_COLUMNS: &str = "id, subscription_id, customer_id, package_id, issue_date, \
     due_date, subtotal_cents, tax_cents, total_cents, status, paid_at, created_at, updated_at";

/// An invoice row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub customer_id: Uuid,
    pub package_id: Uuid,
    pub issue_date: OffsetDateTime,
    pub due_date: OffsetDateTime,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub status: String,
    pub paid_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Invoice {
    pub fn status(&self) -> Option<InvoiceStatus> {
        InvoiceStatus::parse(&self.status)
    }

    /// Status as of `now`, applying the overdue derivation.
    pub fn effective_status_at(&self, now: OffsetDateTime) -> Option<InvoiceStatus> {
        Some(effective_status(self.status()?, self.due_date, now))
    }
}

/// The overdue derivation: pending past due reads as overdue without a
/// write. Paid never regresses.
pub fn effective_status(
    stored: InvoiceStatus,
    due_date: OffsetDateTime,
    now: OffsetDateTime,
) -> InvoiceStatus {
    match stored {
        InvoiceStatus::Pending if due_date < now => InvoiceStatus::Overdue,
        s => s,
    }
}

/// Tax and total for a subtotal at the configured rate.
pub fn compute_totals(subtotal_cents: i64, tax_rate_bps: i64) -> (i64, i64) {
    let tax_cents = (subtotal_cents * tax_rate_bps + 5_000) / 10_000;
    (tax_cents, subtotal_cents + tax_cents)
}

/// Per-customer invoice rollups over derived statuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvoiceMetrics {
    pub total_paid_cents: i64,
    pub total_pending_cents: i64,
    pub total_overdue_cents: i64,
    pub paid_count: i64,
    pub pending_count: i64,
    pub overdue_count: i64,
}

/// Reference rollup over an in-memory invoice set. The SQL rollup in
/// `InvoiceService::customer_invoice_metrics` must agree with this.
pub fn derive_metrics<'a, I>(invoices: I, now: OffsetDateTime) -> InvoiceMetrics
where
    I: IntoIterator<Item = &'a Invoice>,
{
    let mut metrics = InvoiceMetrics::default();
    for invoice in invoices {
        let status = invoice
            .effective_status_at(now)
            .unwrap_or(InvoiceStatus::Pending);
        match status {
            InvoiceStatus::Paid => {
                metrics.total_paid_cents += invoice.total_cents;
                metrics.paid_count += 1;
            }
            InvoiceStatus::Pending => {
                metrics.total_pending_cents += invoice.total_cents;
                metrics.pending_count += 1;
            }
            InvoiceStatus::Overdue => {
                metrics.total_overdue_cents += invoice.total_cents;
                metrics.overdue_count += 1;
            }
        }
    }
    metrics
}

/// Issue an invoice inside an open subscription transaction, so the
/// subscription event and its billing document commit together.
pub(crate) async fn issue_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    config: &BillingConfig,
    subscription_id: Uuid,
    customer_id: Uuid,
    package_id: Uuid,
    subtotal_cents: i64,
    issue_date: OffsetDateTime,
) -> BillingResult<Invoice> {
    let (tax_cents, total_cents) = compute_totals(subtotal_cents, config.tax_rate_bps);
    let due_date = issue_date + Duration::days(config.invoice_due_days);

    let invoice: Invoice = sqlx::query_as(&format!(
        r#"
        INSERT INTO invoices
            (subscription_id, customer_id, package_id, issue_date, due_date,
             subtotal_cents, tax_cents, total_cents, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
        RETURNING {INVOICE_COLUMNS}
        "#
    ))
    .bind(subscription_id)
    .bind(customer_id)
    .bind(package_id)
    .bind(issue_date)
    .bind(due_date)
    .bind(subtotal_cents)
    .bind(tax_cents)
    .bind(total_cents)
    .fetch_one(&mut **tx)
    .await?;

    tracing::info!(
        invoice_id = %invoice.id,
        subscription_id = %subscription_id,
        total_cents = total_cents,
        due_date = %due_date,
        "Issued invoice"
    );

    Ok(invoice)
}

/// Invoice service.
#[derive(Clone)]
pub struct InvoiceService {
    pool: PgPool,
    audit: AuditLogger,
}

impl InvoiceService {
    pub fn new(pool: PgPool) -> Self {
        let audit = AuditLogger::new(pool.clone());
        Self { pool, audit }
    }

    pub async fn get_invoice(&self, invoice_id: Uuid) -> BillingResult<Invoice> {
        let invoice: Option<Invoice> =
            sqlx::query_as(&format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"))
                .bind(invoice_id)
                .fetch_optional(&self.pool)
                .await?;

        invoice.ok_or_else(|| BillingError::NotFound(format!("invoice {}", invoice_id)))
    }

    pub async fn list_for_customer(&self, customer_id: Uuid) -> BillingResult<Vec<Invoice>> {
        let invoices: Vec<Invoice> = sqlx::query_as(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE customer_id = $1
            ORDER BY issue_date DESC, created_at DESC
            "#
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(invoices)
    }

    /// Record payment of a pending (or effectively overdue) invoice.
    ///
    /// Paying a paid invoice is an error — paid is terminal.
    pub async fn pay_invoice(
        &self,
        invoice_id: Uuid,
        paid_at: Option<OffsetDateTime>,
        actor_id: Option<Uuid>,
    ) -> BillingResult<Invoice> {
        let paid_at = paid_at.unwrap_or_else(OffsetDateTime::now_utc);

        let mut tx = self.pool.begin().await?;

        let current: Option<Invoice> = sqlx::query_as(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1 FOR UPDATE"
        ))
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await?;

        let current =
            current.ok_or_else(|| BillingError::NotFound(format!("invoice {}", invoice_id)))?;

        let status = current.status().ok_or_else(|| {
            BillingError::Validation(format!(
                "invoice {} has unrecognized status '{}'",
                invoice_id, current.status
            ))
        })?;

        if status == InvoiceStatus::Paid {
            return Err(BillingError::InvoiceAlreadyPaid(invoice_id));
        }

        let paid: Invoice = sqlx::query_as(&format!(
            r#"
            UPDATE invoices SET
                status = 'paid',
                paid_at = $1,
                updated_at = NOW()
            WHERE id = $2
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(paid_at)
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            invoice_id = %invoice_id,
            customer_id = %paid.customer_id,
            total_cents = paid.total_cents,
            "Invoice paid"
        );

        if let Err(e) = self
            .audit
            .log_event(
                AuditEvent::new("invoice.pay", "invoice", invoice_id)
                    .actor_opt(actor_id, ActorType::User)
                    .before(serde_json::json!({"status": current.status}))
                    .after(serde_json::json!({
                        "status": "paid",
                        "paid_at": paid_at.to_string(),
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log invoice payment audit event");
        }

        Ok(paid)
    }

    /// Rollups per derived status for one customer. Mirrors
    /// `derive_metrics`: the stored column is only trusted for `paid`.
    pub async fn customer_invoice_metrics(
        &self,
        customer_id: Uuid,
        now: OffsetDateTime,
    ) -> BillingResult<InvoiceMetrics> {
        let row: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(total_cents) FILTER (WHERE status = 'paid'), 0)::BIGINT,
                COALESCE(SUM(total_cents) FILTER (WHERE status <> 'paid' AND due_date >= $2), 0)::BIGINT,
                COALESCE(SUM(total_cents) FILTER (WHERE status <> 'paid' AND due_date < $2), 0)::BIGINT,
                COUNT(*) FILTER (WHERE status = 'paid'),
                COUNT(*) FILTER (WHERE status <> 'paid' AND due_date >= $2),
                COUNT(*) FILTER (WHERE status <> 'paid' AND due_date < $2)
            FROM invoices
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(InvoiceMetrics {
            total_paid_cents: row.0,
            total_pending_cents: row.1,
            total_overdue_cents: row.2,
            paid_count: row.3,
            pending_count: row.4,
            overdue_count: row.5,
        })
    }

    /// Materialize the overdue status for indexing/search. Reads do not
    /// depend on this; `effective_status` derives the same answer.
    pub async fn materialize_overdue(&self, now: OffsetDateTime) -> BillingResult<u64> {
        let updated = sqlx::query(
            r#"
            UPDATE invoices SET
                status = 'overdue',
                updated_at = NOW()
            WHERE status = 'pending' AND due_date < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated > 0 {
            tracing::info!(updated = updated, "Materialized overdue invoices");
        }

        Ok(updated)
    }
}
