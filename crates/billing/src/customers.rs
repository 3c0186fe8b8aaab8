//! Customer accounts and the read-side account view.
//!
//! The aggregator composes the customer's live subscription, its package
//! and the invoice rollups into one view. It is recomputed on every read —
//! nothing here is cached, so subscription and invoice mutations are always
//! reflected immediately.

use brokerbooks_shared::{ActorType, AuditEvent, AuditLogger, CustomerStatus, SubscriptionStatus};
use serde::Serialize;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::{BillingError, BillingResult};
use crate::invoices::{InvoiceMetrics, InvoiceService};
use crate::packages::Package;
use crate::subscriptions::{Subscription, SubscriptionService};

const CUSTOMER_COLUMNS: &str = "id, name, status, currency, created_at, updated_at";

/// A customer row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub currency: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Customer {
    pub fn status(&self) -> Option<CustomerStatus> {
        CustomerStatus::parse(&self.status)
    }
}

/// The live subscription portion of the account view.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentSubscription {
    pub subscription: Subscription,
    pub package: Package,
    /// Status with the lazy expiry derivation applied.
    pub effective_status: SubscriptionStatus,
    pub is_expiring_soon: bool,
    pub days_until_expiry: i64,
}

/// Read-side composition for one customer.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerMetrics {
    pub customer_id: Uuid,
    pub total_spent_cents: i64,
    pub total_pending_cents: i64,
    pub total_overdue_cents: i64,
    pub invoices: InvoiceMetrics,
    pub current_subscription: Option<CurrentSubscription>,
}

/// Ceiling of the day difference from `now` to `end`. Negative once the
/// end has passed by at least a day.
pub fn days_until_expiry(end_date: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let secs = (end_date - now).whole_seconds();
    let days = secs.div_euclid(86_400);
    if secs.rem_euclid(86_400) > 0 {
        days + 1
    } else {
        days
    }
}

/// Whether `end_date` is in the future but within the warning window.
pub fn is_expiring_soon(end_date: OffsetDateTime, now: OffsetDateTime, window_days: i64) -> bool {
    end_date > now && end_date <= now + Duration::days(window_days)
}

/// Customer service: account CRUD, archival gating and the aggregator.
#[derive(Clone)]
pub struct CustomerService {
    pool: PgPool,
    config: BillingConfig,
    audit: AuditLogger,
    invoices: InvoiceService,
    subscriptions: SubscriptionService,
}

impl CustomerService {
    pub fn new(pool: PgPool, config: BillingConfig) -> Self {
        let audit = AuditLogger::new(pool.clone());
        let invoices = InvoiceService::new(pool.clone());
        let subscriptions = SubscriptionService::new(pool.clone(), config.clone());
        Self {
            pool,
            config,
            audit,
            invoices,
            subscriptions,
        }
    }

    pub async fn create_customer(&self, name: &str, currency: &str) -> BillingResult<Customer> {
        if name.trim().is_empty() {
            return Err(BillingError::Validation("customer name is required".into()));
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(BillingError::Validation(
                "currency must be a 3-letter code".into(),
            ));
        }

        let customer: Customer = sqlx::query_as(&format!(
            r#"
            INSERT INTO customers (name, status, currency)
            VALUES ($1, 'active', $2)
            RETURNING {CUSTOMER_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(currency.to_ascii_uppercase())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(customer_id = %customer.id, "Created customer");

        Ok(customer)
    }

    pub async fn get_customer(&self, customer_id: Uuid) -> BillingResult<Customer> {
        let customer: Option<Customer> =
            sqlx::query_as(&format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"))
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        customer.ok_or_else(|| BillingError::NotFound(format!("customer {}", customer_id)))
    }

    /// Enable or disable a customer. Archival goes through
    /// `archive_customer`, which gates on outstanding billing state.
    pub async fn set_customer_status(
        &self,
        customer_id: Uuid,
        status: CustomerStatus,
        actor_id: Option<Uuid>,
    ) -> BillingResult<Customer> {
        if status == CustomerStatus::Archived {
            return self.archive_customer(customer_id, actor_id).await;
        }

        let customer: Option<Customer> = sqlx::query_as(&format!(
            r#"
            UPDATE customers
            SET status = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING {CUSTOMER_COLUMNS}
            "#
        ))
        .bind(status.as_str())
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        let customer =
            customer.ok_or_else(|| BillingError::NotFound(format!("customer {}", customer_id)))?;

        tracing::info!(
            customer_id = %customer_id,
            status = %customer.status,
            "Updated customer status"
        );

        Ok(customer)
    }

    /// Archive a customer.
    ///
    /// Refused while the customer has a live subscription or any unpaid
    /// invoice; the checks run inside the write transaction.
    pub async fn archive_customer(
        &self,
        customer_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> BillingResult<Customer> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let current: Option<Customer> = sqlx::query_as(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1 FOR UPDATE"
        ))
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await?;

        let current =
            current.ok_or_else(|| BillingError::NotFound(format!("customer {}", customer_id)))?;

        // Live means trial/active after the expiry derivation: a lapsed
        // non-renewing subscription does not block archival.
        let live_subscriptions: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM subscriptions
            WHERE customer_id = $1
              AND status IN ('trial', 'active')
              AND NOT (end_date < $2 AND auto_renew = false)
            "#,
        )
        .bind(customer_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if live_subscriptions.0 > 0 {
            return Err(BillingError::Conflict(format!(
                "customer {} has a live subscription",
                customer_id
            )));
        }

        let unpaid_invoices: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM invoices WHERE customer_id = $1 AND status <> 'paid'")
                .bind(customer_id)
                .fetch_one(&mut *tx)
                .await?;

        if unpaid_invoices.0 > 0 {
            return Err(BillingError::Conflict(format!(
                "customer {} has unpaid invoices",
                customer_id
            )));
        }

        let archived: Customer = sqlx::query_as(&format!(
            r#"
            UPDATE customers
            SET status = 'archived', updated_at = NOW()
            WHERE id = $1
            RETURNING {CUSTOMER_COLUMNS}
            "#
        ))
        .bind(customer_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(customer_id = %customer_id, "Archived customer");

        if let Err(e) = self
            .audit
            .log_event(
                AuditEvent::new("customer.archive", "customer", customer_id)
                    .actor_opt(actor_id, ActorType::Admin)
                    .before(serde_json::json!({"status": current.status}))
                    .after(serde_json::json!({"status": "archived"})),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log customer archive audit event");
        }

        Ok(archived)
    }

    /// The composed account view: invoice rollups plus the live
    /// subscription with its package and expiry outlook. Recomputed on
    /// every call.
    pub async fn get_customer_metrics(&self, customer_id: Uuid) -> BillingResult<CustomerMetrics> {
        let now = OffsetDateTime::now_utc();

        // Existence check first so a bad id is NotFound, not empty metrics.
        self.get_customer(customer_id).await?;

        let invoices = self
            .invoices
            .customer_invoice_metrics(customer_id, now)
            .await?;

        let current_subscription = match self.subscriptions.get_live_subscription(customer_id).await?
        {
            Some(subscription) => {
                let package: Option<Package> = sqlx::query_as(&format!(
                    "SELECT {} FROM packages WHERE id = $1",
                    crate::packages::PACKAGE_COLUMNS
                ))
                .bind(subscription.package_id)
                .fetch_optional(&self.pool)
                .await?;

                let package = package.ok_or_else(|| {
                    BillingError::NotFound(format!("package {}", subscription.package_id))
                })?;

                let effective_status =
                    subscription.effective_status_at(now).ok_or_else(|| {
                        BillingError::Validation(format!(
                            "subscription {} has unrecognized status '{}'",
                            subscription.id, subscription.status
                        ))
                    })?;

                Some(CurrentSubscription {
                    is_expiring_soon: is_expiring_soon(
                        subscription.end_date,
                        now,
                        self.config.expiring_soon_days,
                    ),
                    days_until_expiry: days_until_expiry(subscription.end_date, now),
                    effective_status,
                    subscription,
                    package,
                })
            }
            None => None,
        };

        Ok(CustomerMetrics {
            customer_id,
            total_spent_cents: invoices.total_paid_cents,
            total_pending_cents: invoices.total_pending_cents,
            total_overdue_cents: invoices.total_overdue_cents,
            invoices,
            current_subscription,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn days_until_expiry_rounds_up() {
        let now = datetime!(2025-05-01 12:00 UTC);

        // half a day out rounds up to 1
        assert_eq!(days_until_expiry(datetime!(2025-05-02 00:00 UTC), now), 1);
        // exactly three days is three
        assert_eq!(days_until_expiry(datetime!(2025-05-04 12:00 UTC), now), 3);
        // three days and one second rounds up to four
        assert_eq!(
            days_until_expiry(datetime!(2025-05-04 12:00:01 UTC), now),
            4
        );
    }

    #[test]
    fn days_until_expiry_past_dates() {
        let now = datetime!(2025-05-01 12:00 UTC);

        // half a day ago: ceil(-0.5) = 0
        assert_eq!(days_until_expiry(datetime!(2025-05-01 00:00 UTC), now), 0);
        // a day and a half ago: ceil(-1.5) = -1
        assert_eq!(days_until_expiry(datetime!(2025-04-30 00:00 UTC), now), -1);
    }

    #[test]
    fn expiring_soon_window_boundaries() {
        let now = datetime!(2025-05-01 00:00 UTC);

        // in the past: not expiring soon, already expired
        assert!(!is_expiring_soon(datetime!(2025-04-30 00:00 UTC), now, 7));
        // exactly seven days out is inside the window
        assert!(is_expiring_soon(datetime!(2025-05-08 00:00 UTC), now, 7));
        // one second past the window is outside
        assert!(!is_expiring_soon(
            datetime!(2025-05-08 00:00:01 UTC),
            now,
            7
        ));
        // tomorrow is inside
        assert!(is_expiring_soon(datetime!(2025-05-02 00:00 UTC), now, 7));
    }

    #[test]
    fn expiring_now_is_not_expiring_soon() {
        let now = datetime!(2025-05-01 00:00 UTC);
        assert!(!is_expiring_soon(now, now, 7));
    }
}
