//! Subscription lifecycle management.
//!
//! Per-customer state machine over trial / active / expired / cancelled,
//! driven by the package catalog. At most one subscription per customer may
//! be trial or active; the check runs inside the write transaction and the
//! partial unique index backs it at the storage layer, so concurrent
//! creates cannot both win.
//!
//! Expiry is time-driven and not stored eagerly: reads derive it via
//! `effective_status`, and the worker sweep materializes it periodically.

use brokerbooks_shared::{
    ActorType, AuditEvent, AuditLogger, CustomerStatus, PackageType, RenewalPolicy,
    SubscriptionStatus,
};
use serde::Serialize;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::{BillingError, BillingResult};
use crate::invoices;
use crate::packages::{Package, PACKAGE_COLUMNS};

const SUBSCRIPTION_COLUMNS: &str = "id, customer_id, package_id, start_date, end_date, status, \
     auto_renew, cancelled_at, created_at, updated_at";

/// A subscription row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub package_id: Uuid,
    pub start_date: OffsetDateTime,
    pub end_date: OffsetDateTime,
    pub status: String,
    pub auto_renew: bool,
    pub cancelled_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    pub fn status(&self) -> Option<SubscriptionStatus> {
        SubscriptionStatus::parse(&self.status)
    }

    /// Status as of `now`, applying the lazy expiry derivation.
    pub fn effective_status_at(&self, now: OffsetDateTime) -> Option<SubscriptionStatus> {
        Some(effective_status(
            self.status()?,
            self.end_date,
            self.auto_renew,
            now,
        ))
    }
}

/// Initial terms computed at creation time from the package snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionTerms {
    pub status: SubscriptionStatus,
    pub end_date: OffsetDateTime,
    pub auto_renew: bool,
}

/// Terms for a new subscription: trial for qualifying free packages, active
/// otherwise. Auto-renew defaults on only for paid packages whose renewal
/// policy is auto_renew.
pub fn initial_terms(
    package_type: PackageType,
    renewal_policy: RenewalPolicy,
    duration_days: i32,
    free_trial_days: i32,
    start_date: OffsetDateTime,
) -> SubscriptionTerms {
    if package_type == PackageType::Free && free_trial_days > 0 {
        SubscriptionTerms {
            status: SubscriptionStatus::Trial,
            end_date: start_date + Duration::days(i64::from(free_trial_days)),
            auto_renew: false,
        }
    } else {
        SubscriptionTerms {
            status: SubscriptionStatus::Active,
            end_date: start_date + Duration::days(i64::from(duration_days)),
            auto_renew: auto_renew_for(package_type, renewal_policy),
        }
    }
}

/// Whether a subscription on this package renews automatically.
pub fn auto_renew_for(package_type: PackageType, renewal_policy: RenewalPolicy) -> bool {
    package_type == PackageType::Paid && renewal_policy == RenewalPolicy::AutoRenew
}

/// Lazy expiry derivation: a live subscription past its end date with
/// auto-renew off reads as expired without a write.
pub fn effective_status(
    status: SubscriptionStatus,
    end_date: OffsetDateTime,
    auto_renew: bool,
    now: OffsetDateTime,
) -> SubscriptionStatus {
    match status {
        SubscriptionStatus::Trial | SubscriptionStatus::Active
            if end_date < now && !auto_renew =>
        {
            SubscriptionStatus::Expired
        }
        s => s,
    }
}

/// Counts from a lifecycle sweep run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepOutcome {
    pub expired: u64,
    pub renewed: u64,
    pub errors: u64,
}

/// Subscription lifecycle service.
#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
    config: BillingConfig,
    audit: AuditLogger,
}

impl SubscriptionService {
    pub fn new(pool: PgPool, config: BillingConfig) -> Self {
        let audit = AuditLogger::new(pool.clone());
        Self {
            pool,
            config,
            audit,
        }
    }

    /// Create a subscription for a customer on a package.
    ///
    /// Fails with `DuplicateActiveSubscription` when the customer already
    /// has a live subscription, `NotFound` for a missing customer/package
    /// and `Validation` for an archived customer or inactive package. Paid
    /// packages get their first invoice in the same transaction.
    pub async fn create_subscription(
        &self,
        customer_id: Uuid,
        package_id: Uuid,
        start_date: Option<OffsetDateTime>,
        actor_id: Option<Uuid>,
    ) -> BillingResult<Subscription> {
        let start_date = start_date.unwrap_or_else(OffsetDateTime::now_utc);

        let mut tx = self.pool.begin().await?;

        let customer_status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM customers WHERE id = $1")
                .bind(customer_id)
                .fetch_optional(&mut *tx)
                .await?;

        let (customer_status,) = customer_status
            .ok_or_else(|| BillingError::NotFound(format!("customer {}", customer_id)))?;
        match CustomerStatus::parse(&customer_status) {
            Some(CustomerStatus::Archived) => {
                return Err(BillingError::Validation(format!(
                    "customer {} is archived",
                    customer_id
                )));
            }
            Some(_) => {}
            None => {
                return Err(BillingError::Validation(format!(
                    "customer {} has unrecognized status '{}'",
                    customer_id, customer_status
                )));
            }
        }

        let package: Option<Package> = sqlx::query_as(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = $1"
        ))
        .bind(package_id)
        .fetch_optional(&mut *tx)
        .await?;

        let package =
            package.ok_or_else(|| BillingError::NotFound(format!("package {}", package_id)))?;

        let (package_type, renewal_policy, package_status) = parse_package(&package)?;
        if package_status != brokerbooks_shared::PackageStatus::Active {
            return Err(BillingError::Validation(format!(
                "package {} is not active",
                package_id
            )));
        }

        // Application-level check; the partial unique index catches the
        // race where two creates pass it concurrently.
        let existing: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM subscriptions WHERE customer_id = $1 AND status IN ('trial', 'active')",
        )
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            return Err(BillingError::DuplicateActiveSubscription);
        }

        let terms = initial_terms(
            package_type,
            renewal_policy,
            package.duration_days,
            package.free_trial_days,
            start_date,
        );

        let subscription: Subscription = sqlx::query_as(&format!(
            r#"
            INSERT INTO subscriptions
                (customer_id, package_id, start_date, end_date, status, auto_renew)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(customer_id)
        .bind(package_id)
        .bind(start_date)
        .bind(terms.end_date)
        .bind(terms.status.as_str())
        .bind(terms.auto_renew)
        .fetch_one(&mut *tx)
        .await
        .map_err(BillingError::from_subscription_insert)?;

        if package_type == PackageType::Paid {
            invoices::issue_in_tx(
                &mut tx,
                &self.config,
                subscription.id,
                customer_id,
                package_id,
                package.price_cents,
                start_date,
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            customer_id = %customer_id,
            subscription_id = %subscription.id,
            package_id = %package_id,
            status = %subscription.status,
            end_date = %subscription.end_date,
            "Created subscription"
        );

        if let Err(e) = self
            .audit
            .log_event(
                AuditEvent::new("subscription.create", "subscription", subscription.id)
                    .actor_opt(actor_id, ActorType::User)
                    .after(serde_json::json!({
                        "customer_id": customer_id,
                        "package_id": package_id,
                        "status": subscription.status,
                        "end_date": subscription.end_date.to_string(),
                        "auto_renew": subscription.auto_renew,
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log subscription create audit event");
        }

        Ok(subscription)
    }

    /// Renew a subscription, extending its end date.
    ///
    /// Forbidden on a cancelled subscription. The extension is the explicit
    /// override or the package's duration; status returns to active and
    /// auto-renew is recomputed from the package. Paid packages get a
    /// renewal invoice in the same transaction.
    pub async fn renew_subscription(
        &self,
        subscription_id: Uuid,
        duration_days: Option<i32>,
        actor_id: Option<Uuid>,
    ) -> BillingResult<Subscription> {
        let mut tx = self.pool.begin().await?;

        let current: Option<Subscription> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1 FOR UPDATE"
        ))
        .bind(subscription_id)
        .fetch_optional(&mut *tx)
        .await?;

        let current = current
            .ok_or_else(|| BillingError::NotFound(format!("subscription {}", subscription_id)))?;

        let status = parse_subscription_status(&current)?;
        if status == SubscriptionStatus::Cancelled {
            return Err(BillingError::AlreadyCancelled(subscription_id));
        }

        let package: Option<Package> = sqlx::query_as(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = $1"
        ))
        .bind(current.package_id)
        .fetch_optional(&mut *tx)
        .await?;

        let package = package
            .ok_or_else(|| BillingError::NotFound(format!("package {}", current.package_id)))?;
        let (package_type, renewal_policy, _) = parse_package(&package)?;

        let days = duration_days.unwrap_or(package.duration_days);
        if days <= 0 {
            return Err(BillingError::Validation(
                "renewal duration must be positive".into(),
            ));
        }

        let new_end = current.end_date + Duration::days(i64::from(days));
        let auto_renew = auto_renew_for(package_type, renewal_policy);

        let renewed: Subscription = sqlx::query_as(&format!(
            r#"
            UPDATE subscriptions SET
                end_date = $1,
                status = 'active',
                cancelled_at = NULL,
                auto_renew = $2,
                updated_at = NOW()
            WHERE id = $3
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(new_end)
        .bind(auto_renew)
        .bind(subscription_id)
        .fetch_one(&mut *tx)
        .await?;

        if package_type == PackageType::Paid {
            invoices::issue_in_tx(
                &mut tx,
                &self.config,
                subscription_id,
                current.customer_id,
                current.package_id,
                package.price_cents,
                OffsetDateTime::now_utc(),
            )
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription_id,
            customer_id = %current.customer_id,
            end_date = %renewed.end_date,
            "Renewed subscription"
        );

        if let Err(e) = self
            .audit
            .log_event(
                AuditEvent::new("subscription.renew", "subscription", subscription_id)
                    .actor_opt(actor_id, ActorType::User)
                    .before(serde_json::json!({
                        "status": current.status,
                        "end_date": current.end_date.to_string(),
                    }))
                    .after(serde_json::json!({
                        "status": renewed.status,
                        "end_date": renewed.end_date.to_string(),
                        "auto_renew": renewed.auto_renew,
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log subscription renew audit event");
        }

        Ok(renewed)
    }

    /// Cancel a subscription.
    ///
    /// Cancelling an already-cancelled subscription is an error, not a
    /// no-op.
    pub async fn cancel_subscription(
        &self,
        subscription_id: Uuid,
        reason: Option<&str>,
        actor_id: Option<Uuid>,
    ) -> BillingResult<Subscription> {
        let mut tx = self.pool.begin().await?;

        let current: Option<Subscription> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1 FOR UPDATE"
        ))
        .bind(subscription_id)
        .fetch_optional(&mut *tx)
        .await?;

        let current = current
            .ok_or_else(|| BillingError::NotFound(format!("subscription {}", subscription_id)))?;

        let status = parse_subscription_status(&current)?;
        if status == SubscriptionStatus::Cancelled {
            return Err(BillingError::AlreadyCancelled(subscription_id));
        }

        let cancelled: Subscription = sqlx::query_as(&format!(
            r#"
            UPDATE subscriptions SET
                status = 'cancelled',
                cancelled_at = NOW(),
                auto_renew = false,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription_id,
            customer_id = %current.customer_id,
            reason = reason.unwrap_or("(none)"),
            "Cancelled subscription"
        );

        if let Err(e) = self
            .audit
            .log_event(
                AuditEvent::new("subscription.cancel", "subscription", subscription_id)
                    .actor_opt(actor_id, ActorType::User)
                    .before(serde_json::json!({"status": current.status}))
                    .after(serde_json::json!({
                        "status": cancelled.status,
                        "reason": reason,
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log subscription cancel audit event");
        }

        Ok(cancelled)
    }

    pub async fn get_subscription(&self, subscription_id: Uuid) -> BillingResult<Subscription> {
        let subscription: Option<Subscription> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        subscription
            .ok_or_else(|| BillingError::NotFound(format!("subscription {}", subscription_id)))
    }

    /// The customer's live subscription, if any.
    pub async fn get_live_subscription(
        &self,
        customer_id: Uuid,
    ) -> BillingResult<Option<Subscription>> {
        let subscription: Option<Subscription> = sqlx::query_as(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE customer_id = $1 AND status IN ('trial', 'active')
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscription)
    }

    /// Materialize expiry for live subscriptions past their end date with
    /// auto-renew off. Reads never depend on this — `effective_status`
    /// derives the same answer — it exists for indexing and search.
    pub async fn expire_due_subscriptions(&self, now: OffsetDateTime) -> BillingResult<u64> {
        let expired: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE subscriptions SET
                status = 'expired',
                updated_at = NOW()
            WHERE status IN ('trial', 'active')
              AND end_date < $1
              AND auto_renew = false
            RETURNING id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        for (id,) in &expired {
            if let Err(e) = self
                .audit
                .log_event(
                    AuditEvent::new("subscription.expire", "subscription", *id)
                        .actor_opt(None, ActorType::System)
                        .after(serde_json::json!({"status": "expired"})),
                )
                .await
            {
                tracing::warn!(error = %e, "Failed to log subscription expire audit event");
            }
        }

        Ok(expired.len() as u64)
    }

    /// Renew subscriptions past their end date that are flagged for
    /// auto-renewal. Each renewal goes through the normal renew path, so
    /// invoices and audit records are issued as usual.
    pub async fn auto_renew_due_subscriptions(
        &self,
        now: OffsetDateTime,
    ) -> BillingResult<SweepOutcome> {
        let due: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM subscriptions
            WHERE status IN ('trial', 'active')
              AND end_date < $1
              AND auto_renew = true
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut outcome = SweepOutcome::default();
        for (id,) in due {
            match self.renew_subscription(id, None, None).await {
                Ok(_) => outcome.renewed += 1,
                Err(e) => {
                    tracing::error!(subscription_id = %id, error = %e, "Auto-renewal failed");
                    outcome.errors += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Run both halves of the lifecycle sweep.
    pub async fn run_lifecycle_sweep(&self, now: OffsetDateTime) -> BillingResult<SweepOutcome> {
        let mut outcome = self.auto_renew_due_subscriptions(now).await?;
        outcome.expired = self.expire_due_subscriptions(now).await?;

        tracing::info!(
            expired = outcome.expired,
            renewed = outcome.renewed,
            errors = outcome.errors,
            "Subscription lifecycle sweep complete"
        );

        Ok(outcome)
    }
}

fn parse_subscription_status(sub: &Subscription) -> BillingResult<SubscriptionStatus> {
    sub.status().ok_or_else(|| {
        BillingError::Validation(format!(
            "subscription {} has unrecognized status '{}'",
            sub.id, sub.status
        ))
    })
}

fn parse_package(
    package: &Package,
) -> BillingResult<(PackageType, RenewalPolicy, brokerbooks_shared::PackageStatus)> {
    let package_type = package.package_type().ok_or_else(|| {
        BillingError::Validation(format!(
            "package {} has unrecognized type '{}'",
            package.id, package.package_type
        ))
    })?;
    let renewal_policy = package.renewal_policy().ok_or_else(|| {
        BillingError::Validation(format!(
            "package {} has unrecognized renewal policy '{}'",
            package.id, package.renewal_policy
        ))
    })?;
    let status = package.status().ok_or_else(|| {
        BillingError::Validation(format!(
            "package {} has unrecognized status '{}'",
            package.id, package.status
        ))
    })?;
    Ok((package_type, renewal_policy, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn free_package_with_trial_starts_in_trial() {
        let start = datetime!(2025-04-01 00:00 UTC);
        let terms = initial_terms(PackageType::Free, RenewalPolicy::Manual, 30, 7, start);

        assert_eq!(terms.status, SubscriptionStatus::Trial);
        assert_eq!(terms.end_date, start + Duration::days(7));
        assert!(!terms.auto_renew);
    }

    #[test]
    fn free_package_without_trial_starts_active() {
        let start = datetime!(2025-04-01 00:00 UTC);
        let terms = initial_terms(PackageType::Free, RenewalPolicy::Manual, 30, 0, start);

        assert_eq!(terms.status, SubscriptionStatus::Active);
        assert_eq!(terms.end_date, start + Duration::days(30));
        assert!(!terms.auto_renew);
    }

    #[test]
    fn paid_package_starts_active_with_auto_renew() {
        let start = datetime!(2025-04-01 00:00 UTC);
        let terms = initial_terms(PackageType::Paid, RenewalPolicy::AutoRenew, 30, 0, start);

        assert_eq!(terms.status, SubscriptionStatus::Active);
        assert!(terms.auto_renew);
    }

    #[test]
    fn paid_package_ignores_trial_days() {
        // free trials are a free-package feature
        let start = datetime!(2025-04-01 00:00 UTC);
        let terms = initial_terms(PackageType::Paid, RenewalPolicy::AutoRenew, 30, 14, start);

        assert_eq!(terms.status, SubscriptionStatus::Active);
        assert_eq!(terms.end_date, start + Duration::days(30));
    }

    #[test]
    fn manual_paid_package_does_not_auto_renew() {
        assert!(!auto_renew_for(PackageType::Paid, RenewalPolicy::Manual));
        assert!(!auto_renew_for(PackageType::Free, RenewalPolicy::AutoRenew));
        assert!(auto_renew_for(PackageType::Paid, RenewalPolicy::AutoRenew));
    }

    #[test]
    fn effective_status_expires_lapsed_non_renewing() {
        let end = datetime!(2025-04-30 00:00 UTC);
        let after = datetime!(2025-04-30 00:00:01 UTC);
        let before = datetime!(2025-04-29 23:59:59 UTC);

        assert_eq!(
            effective_status(SubscriptionStatus::Active, end, false, after),
            SubscriptionStatus::Expired
        );
        assert_eq!(
            effective_status(SubscriptionStatus::Trial, end, false, after),
            SubscriptionStatus::Expired
        );
        assert_eq!(
            effective_status(SubscriptionStatus::Active, end, false, before),
            SubscriptionStatus::Active
        );
    }

    #[test]
    fn effective_status_keeps_auto_renewing_alive() {
        // past end with auto-renew on: the sweep renews it, reads keep it active
        let end = datetime!(2025-04-30 00:00 UTC);
        let after = datetime!(2025-05-02 00:00 UTC);
        assert_eq!(
            effective_status(SubscriptionStatus::Active, end, true, after),
            SubscriptionStatus::Active
        );
    }

    #[test]
    fn effective_status_leaves_terminal_states() {
        let end = datetime!(2025-04-30 00:00 UTC);
        let after = datetime!(2025-05-02 00:00 UTC);
        assert_eq!(
            effective_status(SubscriptionStatus::Cancelled, end, false, after),
            SubscriptionStatus::Cancelled
        );
        assert_eq!(
            effective_status(SubscriptionStatus::Expired, end, false, after),
            SubscriptionStatus::Expired
        );
    }
}
