//! Brokerbooks Background Worker
//!
//! Handles scheduled jobs including:
//! - Subscription lifecycle sweep: auto-renewals and expiry (hourly)
//! - Invoice overdue materialization for indexing (every 15 minutes)
//! - Wallet aggregate reconciliation against the transaction log (daily at 3:30 AM UTC)
//! - Billing invariant checks (daily at 4:00 AM UTC)
//! - Health check heartbeat (every 5 minutes)

use std::sync::Arc;
use std::time::Duration;

use brokerbooks_billing::BillingService;
use brokerbooks_ledger::WalletService;
use sqlx::postgres::PgPoolOptions;
use time::OffsetDateTime;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    #[allow(clippy::expect_used)] // Fail-fast on startup if required config is missing
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Brokerbooks Worker");

    // Create database pool
    let pool = create_db_pool().await?;

    // Create services
    let billing = Arc::new(BillingService::from_env(pool.clone()));
    let wallets = WalletService::from_env(pool.clone());

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Subscription lifecycle sweep (hourly)
    // Renews lapsed auto-renewing subscriptions and expires the rest.
    let lifecycle_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let billing = lifecycle_billing.clone();
            Box::pin(async move {
                info!("Running subscription lifecycle sweep");
                match billing
                    .subscriptions
                    .run_lifecycle_sweep(OffsetDateTime::now_utc())
                    .await
                {
                    Ok(outcome) => {
                        info!(
                            expired = outcome.expired,
                            renewed = outcome.renewed,
                            errors = outcome.errors,
                            "Lifecycle sweep complete"
                        );
                    }
                    Err(e) => error!(error = %e, "Lifecycle sweep failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Subscription lifecycle sweep (hourly)");

    // Job 2: Materialize overdue invoices (every 15 minutes)
    // Reads never depend on the stored status; this keeps search/indexing
    // current.
    let overdue_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 */15 * * * *", move |_uuid, _l| {
            let billing = overdue_billing.clone();
            Box::pin(async move {
                match billing
                    .invoices
                    .materialize_overdue(OffsetDateTime::now_utc())
                    .await
                {
                    Ok(0) => {}
                    Ok(updated) => info!(updated = updated, "Overdue materialization complete"),
                    Err(e) => error!(error = %e, "Overdue materialization failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Invoice overdue materialization (every 15 minutes)");

    // Job 3: Wallet aggregate reconciliation (daily at 3:30 AM UTC)
    // Re-derives every wallet's aggregates from its transaction log and
    // repairs drift.
    let reconcile_wallets = wallets.clone();
    scheduler
        .add(Job::new_async("0 30 3 * * *", move |_uuid, _l| {
            let wallets = reconcile_wallets.clone();
            Box::pin(async move {
                info!("Running wallet aggregate reconciliation");
                match wallets.reconcile_all().await {
                    Ok(reports) => {
                        let drifted = reports.iter().filter(|r| r.drifted).count();
                        let repaired = reports.iter().filter(|r| r.repaired).count();
                        if drifted > 0 {
                            warn!(
                                wallets = reports.len(),
                                drifted = drifted,
                                repaired = repaired,
                                "Wallet reconciliation found drift"
                            );
                        } else {
                            info!(wallets = reports.len(), "Wallet reconciliation clean");
                        }
                    }
                    Err(e) => error!(error = %e, "Wallet reconciliation failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Wallet aggregate reconciliation (daily 3:30 UTC)");

    // Job 4: Billing invariant checks (daily at 4:00 AM UTC)
    let invariant_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 4 * * *", move |_uuid, _l| {
            let billing = invariant_billing.clone();
            Box::pin(async move {
                info!("Running billing invariant checks");
                match billing.invariants.run_all_checks().await {
                    Ok(summary) => {
                        if summary.healthy {
                            info!(checks_run = summary.checks_run, "All invariants hold");
                        } else {
                            for violation in &summary.violations {
                                error!(
                                    invariant = %violation.invariant,
                                    severity = %violation.severity,
                                    description = %violation.description,
                                    "Invariant violation"
                                );
                            }
                            warn!(
                                checks_failed = summary.checks_failed,
                                violations = summary.violations.len(),
                                "Invariant check found violations"
                            );
                        }
                    }
                    Err(e) => error!(error = %e, "Invariant check failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Billing invariant checks (daily 4:00 UTC)");

    // Job 5: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    scheduler.start().await?;
    info!("Worker started");

    // Keep the process alive; jobs run on the scheduler's timers
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
