//! Package catalog.
//!
//! Product definitions consumed by the subscription lifecycle. Immutable
//! reference data from a subscription's point of view: lifecycle operations
//! read duration/price at the time of the operation, so later edits to a
//! package never rewrite existing subscriptions.

use brokerbooks_shared::{PackageStatus, PackageType, RenewalPolicy};
use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

pub(crate) const PACKAGE_COLUMNS: &str = "id, name, package_type, price_cents, duration_days, \
     free_trial_days, renewal_policy, status, created_at, updated_at";

/// A catalog row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Package {
    pub id: Uuid,
    pub name: String,
    pub package_type: String,
    pub price_cents: i64,
    pub duration_days: i32,
    pub free_trial_days: i32,
    pub renewal_policy: String,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Package {
    pub fn package_type(&self) -> Option<PackageType> {
        PackageType::parse(&self.package_type)
    }

    pub fn renewal_policy(&self) -> Option<RenewalPolicy> {
        RenewalPolicy::parse(&self.renewal_policy)
    }

    pub fn status(&self) -> Option<PackageStatus> {
        PackageStatus::parse(&self.status)
    }
}

/// Parameters for creating a package.
#[derive(Debug, Clone)]
pub struct NewPackage {
    pub name: String,
    pub package_type: PackageType,
    pub price_cents: i64,
    pub duration_days: i32,
    pub free_trial_days: i32,
    pub renewal_policy: RenewalPolicy,
}

/// Catalog service.
#[derive(Clone)]
pub struct PackageService {
    pool: PgPool,
}

impl PackageService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_package(&self, params: &NewPackage) -> BillingResult<Package> {
        if params.name.trim().is_empty() {
            return Err(BillingError::Validation("package name is required".into()));
        }
        if params.duration_days <= 0 {
            return Err(BillingError::Validation(
                "package duration must be positive".into(),
            ));
        }
        if params.free_trial_days < 0 {
            return Err(BillingError::Validation(
                "free trial duration cannot be negative".into(),
            ));
        }
        if params.price_cents < 0 {
            return Err(BillingError::Validation(
                "package price cannot be negative".into(),
            ));
        }
        if params.package_type == PackageType::Free && params.price_cents != 0 {
            return Err(BillingError::Validation(
                "free packages must have a zero price".into(),
            ));
        }

        let package: Package = sqlx::query_as(&format!(
            r#"
            INSERT INTO packages
                (name, package_type, price_cents, duration_days, free_trial_days,
                 renewal_policy, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'active')
            RETURNING {PACKAGE_COLUMNS}
            "#
        ))
        .bind(&params.name)
        .bind(params.package_type.as_str())
        .bind(params.price_cents)
        .bind(params.duration_days)
        .bind(params.free_trial_days)
        .bind(params.renewal_policy.as_str())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            package_id = %package.id,
            package_type = %package.package_type,
            price_cents = package.price_cents,
            "Created package"
        );

        Ok(package)
    }

    pub async fn get_package(&self, package_id: Uuid) -> BillingResult<Package> {
        let package: Option<Package> =
            sqlx::query_as(&format!("SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = $1"))
                .bind(package_id)
                .fetch_optional(&self.pool)
                .await?;

        package.ok_or_else(|| BillingError::NotFound(format!("package {}", package_id)))
    }

    /// List packages, optionally filtered by status.
    pub async fn list_packages(&self, status: Option<PackageStatus>) -> BillingResult<Vec<Package>> {
        let packages: Vec<Package> = match status {
            Some(status) => {
                sqlx::query_as(&format!(
                    "SELECT {PACKAGE_COLUMNS} FROM packages WHERE status = $1 ORDER BY created_at"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {PACKAGE_COLUMNS} FROM packages ORDER BY created_at"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(packages)
    }

    /// Activate or retire a package. Retiring only blocks new
    /// subscriptions; existing ones keep their computed dates.
    pub async fn set_package_status(
        &self,
        package_id: Uuid,
        status: PackageStatus,
    ) -> BillingResult<Package> {
        let package: Option<Package> = sqlx::query_as(&format!(
            r#"
            UPDATE packages
            SET status = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING {PACKAGE_COLUMNS}
            "#
        ))
        .bind(status.as_str())
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await?;

        let package =
            package.ok_or_else(|| BillingError::NotFound(format!("package {}", package_id)))?;

        tracing::info!(
            package_id = %package_id,
            status = %package.status,
            "Updated package status"
        );

        Ok(package)
    }
}
