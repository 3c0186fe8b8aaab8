//! Wallet ledger service.
//!
//! Owns the append-only transaction log and the wallet aggregate row.
//! `create_transaction` is the only write path for ledger entries: it locks
//! the wallet row, runs the monthly limit guard and fee evaluator against
//! that consistent view, appends, and updates the aggregates — all in one
//! database transaction. Aggregates are maintained incrementally; the
//! reconciliation path re-derives them from the log to detect drift.

use brokerbooks_shared::{ActorType, AuditEvent, AuditLogger, TransactionType};
use serde::Serialize;
use sqlx::PgPool;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::aggregates::{month_anchor, next_month_anchor, LedgerEntry, WalletAggregates};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::fees::FeeSchedule;
use crate::limits::LimitDecision;

const WALLET_COLUMNS: &str = "id, name, fee_type, fee_percent_bps, fee_per_thousand_cents, \
     fee_fixed_cents, max_fee_cents, balance_cents, total_deposits_cents, \
     total_withdrawals_cents, total_fees_earned_cents, monthly_volume_cents, monthly_tx_count, \
     month_anchor, is_archived, created_at, updated_at";

const TRANSACTION_COLUMNS: &str =
    "id, wallet_id, tx_type, amount_cents, fee_cents, description, entry_date, status, created_at";

/// A wallet row: fee configuration plus the incrementally maintained
/// aggregates.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub name: String,
    pub fee_type: String,
    pub fee_percent_bps: i64,
    pub fee_per_thousand_cents: i64,
    pub fee_fixed_cents: i64,
    pub max_fee_cents: i64,
    pub balance_cents: i64,
    pub total_deposits_cents: i64,
    pub total_withdrawals_cents: i64,
    pub total_fees_earned_cents: i64,
    pub monthly_volume_cents: i64,
    pub monthly_tx_count: i64,
    pub month_anchor: Date,
    pub is_archived: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Wallet {
    /// Fee schedule parsed from the stored columns; `None` means the row's
    /// tag is unrecognized and transactions must be rejected.
    pub fn fee_schedule(&self) -> Option<FeeSchedule> {
        FeeSchedule::from_columns(
            &self.fee_type,
            self.fee_percent_bps,
            self.fee_per_thousand_cents,
            self.fee_fixed_cents,
            self.max_fee_cents,
        )
    }

    fn aggregates(&self) -> WalletAggregates {
        WalletAggregates {
            balance_cents: self.balance_cents,
            total_deposits_cents: self.total_deposits_cents,
            total_withdrawals_cents: self.total_withdrawals_cents,
            total_fees_earned_cents: self.total_fees_earned_cents,
            monthly_volume_cents: self.monthly_volume_cents,
            monthly_tx_count: self.monthly_tx_count,
            month_anchor: self.month_anchor,
        }
    }
}

/// One settled ledger entry. Immutable once created.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub tx_type: String,
    pub amount_cents: i64,
    pub fee_cents: i64,
    pub description: String,
    pub entry_date: OffsetDateTime,
    pub status: String,
    pub created_at: OffsetDateTime,
}

impl WalletTransaction {
    /// Typed view for the aggregate math; `None` on a corrupt tag.
    pub fn entry(&self) -> Option<LedgerEntry> {
        Some(LedgerEntry {
            tx_type: TransactionType::parse(&self.tx_type)?,
            amount_cents: self.amount_cents,
            fee_cents: self.fee_cents,
            entry_date: self.entry_date,
        })
    }
}

/// Read-side summary of a wallet. Monthly figures cover the current
/// calendar month; a wallet with no activity this month reports zeros.
#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub wallet_id: Uuid,
    pub balance_cents: i64,
    pub total_deposits_cents: i64,
    pub total_withdrawals_cents: i64,
    pub total_fees_earned_cents: i64,
    pub monthly_transactions: i64,
    pub monthly_volume_cents: i64,
}

/// Result of reconciling one wallet's stored aggregates against the log.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub wallet_id: Uuid,
    pub drifted: bool,
    pub repaired: bool,
    pub stored: WalletAggregates,
    pub expected: WalletAggregates,
}

/// Wallet ledger service.
#[derive(Clone)]
pub struct WalletService {
    pool: PgPool,
    config: LedgerConfig,
    audit: AuditLogger,
}

impl WalletService {
    pub fn new(pool: PgPool, config: LedgerConfig) -> Self {
        let audit = AuditLogger::new(pool.clone());
        Self {
            pool,
            config,
            audit,
        }
    }

    /// Create a service configured from environment variables.
    pub fn from_env(pool: PgPool) -> Self {
        Self::new(pool, LedgerConfig::from_env())
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Create a wallet with the given fee schedule.
    pub async fn create_wallet(&self, name: &str, schedule: &FeeSchedule) -> LedgerResult<Wallet> {
        if name.trim().is_empty() {
            return Err(LedgerError::Validation("wallet name is required".into()));
        }

        let (bps, per_block, fixed) = match schedule.policy {
            crate::fees::FeePolicy::Percentage { rate_bps } => (rate_bps, 0, 0),
            crate::fees::FeePolicy::PerThousand { per_block_cents } => (0, per_block_cents, 0),
            crate::fees::FeePolicy::Fixed { amount_cents } => (0, 0, amount_cents),
        };

        let anchor = month_anchor(OffsetDateTime::now_utc());
        let wallet: Wallet = sqlx::query_as(&format!(
            r#"
            INSERT INTO wallets
                (name, fee_type, fee_percent_bps, fee_per_thousand_cents, fee_fixed_cents,
                 max_fee_cents, month_anchor)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {WALLET_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(schedule.fee_type_tag())
        .bind(bps)
        .bind(per_block)
        .bind(fixed)
        .bind(schedule.max_fee_cents)
        .bind(anchor)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            wallet_id = %wallet.id,
            fee_type = %wallet.fee_type,
            "Created wallet"
        );

        Ok(wallet)
    }

    pub async fn get_wallet(&self, wallet_id: Uuid) -> LedgerResult<Wallet> {
        let wallet: Option<Wallet> =
            sqlx::query_as(&format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1"))
                .bind(wallet_id)
                .fetch_optional(&self.pool)
                .await?;

        wallet.ok_or_else(|| LedgerError::NotFound(format!("wallet {}", wallet_id)))
    }

    /// Archive a wallet. Archived wallets keep their history but reject new
    /// activity. Archiving an already-archived wallet is a no-op.
    pub async fn archive_wallet(
        &self,
        wallet_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> LedgerResult<Wallet> {
        let wallet: Option<Wallet> = sqlx::query_as(&format!(
            r#"
            UPDATE wallets
            SET is_archived = true, updated_at = NOW()
            WHERE id = $1
            RETURNING {WALLET_COLUMNS}
            "#
        ))
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?;

        let wallet = wallet.ok_or_else(|| LedgerError::NotFound(format!("wallet {}", wallet_id)))?;

        tracing::info!(wallet_id = %wallet_id, "Archived wallet");

        if let Err(e) = self
            .audit
            .log_event(
                AuditEvent::new("wallet.archive", "wallet", wallet_id)
                    .actor_opt(actor_id, ActorType::Admin)
                    .after(serde_json::json!({"is_archived": true})),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log wallet archive audit event");
        }

        Ok(wallet)
    }

    /// Append a transaction to a wallet's ledger.
    ///
    /// The limit guard and fee evaluator run against the row-locked wallet,
    /// so two concurrent appends cannot both observe the same remaining
    /// capacity. The accepted amount may be clamped to what remains under
    /// the monthly cap; the fee is computed on the clamped amount.
    pub async fn create_transaction(
        &self,
        wallet_id: Uuid,
        tx_type: TransactionType,
        amount_cents: i64,
        description: &str,
        entry_date: OffsetDateTime,
        actor_id: Option<Uuid>,
    ) -> LedgerResult<WalletTransaction> {
        if amount_cents <= 0 {
            return Err(LedgerError::Validation(
                "transaction amount must be positive".into(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let wallet: Option<Wallet> = sqlx::query_as(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1 FOR UPDATE"
        ))
        .bind(wallet_id)
        .fetch_optional(&mut *tx)
        .await?;

        let wallet = wallet.ok_or_else(|| LedgerError::NotFound(format!("wallet {}", wallet_id)))?;

        if wallet.is_archived {
            return Err(LedgerError::WalletArchived(wallet_id));
        }

        let schedule = wallet.fee_schedule().ok_or_else(|| {
            LedgerError::Validation(format!(
                "wallet {} has unrecognized fee policy '{}'",
                wallet_id, wallet.fee_type
            ))
        })?;

        // Settled volume for the entry's calendar month. The stored counter
        // covers the anchor month; a back-dated entry re-derives its month
        // from the log under the same row lock.
        let entry_month = month_anchor(entry_date);
        let month_volume_cents = if entry_month == wallet.month_anchor {
            wallet.monthly_volume_cents
        } else if entry_month > wallet.month_anchor {
            0
        } else {
            let lower = entry_month.midnight().assume_utc();
            let upper = next_month_anchor(entry_month).midnight().assume_utc();
            let (volume,): (i64,) = sqlx::query_as(
                r#"
                SELECT COALESCE(SUM(amount_cents), 0)::BIGINT
                FROM wallet_transactions
                WHERE wallet_id = $1 AND entry_date >= $2 AND entry_date < $3
                "#,
            )
            .bind(wallet_id)
            .bind(lower)
            .bind(upper)
            .fetch_one(&mut *tx)
            .await?;
            volume
        };

        let decision =
            LimitDecision::evaluate(self.config.monthly_cap_cents, month_volume_cents, amount_cents);

        let accepted_cents = match decision {
            LimitDecision::Rejected { remaining_cents } => {
                tracing::info!(
                    wallet_id = %wallet_id,
                    requested_cents = amount_cents,
                    "Rejected transaction: monthly cap exhausted"
                );
                return Err(LedgerError::LimitExceeded {
                    requested_cents: amount_cents,
                    remaining_cents,
                });
            }
            LimitDecision::Clamped {
                amount_cents: clamped,
                requested_cents,
            } => {
                tracing::info!(
                    wallet_id = %wallet_id,
                    requested_cents = requested_cents,
                    clamped_cents = clamped,
                    "Clamped transaction to remaining monthly capacity"
                );
                clamped
            }
            LimitDecision::Allowed { amount_cents } => amount_cents,
        };

        let fee_cents = schedule.fee_for_amount(accepted_cents);

        let record: WalletTransaction = sqlx::query_as(&format!(
            r#"
            INSERT INTO wallet_transactions
                (wallet_id, tx_type, amount_cents, fee_cents, description, entry_date, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'settled')
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(wallet_id)
        .bind(tx_type.as_str())
        .bind(accepted_cents)
        .bind(fee_cents)
        .bind(description)
        .bind(entry_date)
        .fetch_one(&mut *tx)
        .await?;

        // Incremental aggregate update, mirroring WalletAggregates::apply.
        let (balance_delta, deposit_delta, withdrawal_delta) = match tx_type {
            TransactionType::Deposit => (accepted_cents, accepted_cents, 0_i64),
            TransactionType::Withdrawal => (-(accepted_cents + fee_cents), 0, accepted_cents),
        };

        sqlx::query(
            r#"
            UPDATE wallets SET
                balance_cents = balance_cents + $1,
                total_deposits_cents = total_deposits_cents + $2,
                total_withdrawals_cents = total_withdrawals_cents + $3,
                total_fees_earned_cents = total_fees_earned_cents + $4,
                monthly_volume_cents = CASE
                    WHEN month_anchor = $5 THEN monthly_volume_cents + $6
                    WHEN month_anchor < $5 THEN $6
                    ELSE monthly_volume_cents
                END,
                monthly_tx_count = CASE
                    WHEN month_anchor = $5 THEN monthly_tx_count + 1
                    WHEN month_anchor < $5 THEN 1
                    ELSE monthly_tx_count
                END,
                month_anchor = GREATEST(month_anchor, $5),
                updated_at = NOW()
            WHERE id = $7
            "#,
        )
        .bind(balance_delta)
        .bind(deposit_delta)
        .bind(withdrawal_delta)
        .bind(fee_cents)
        .bind(entry_month)
        .bind(accepted_cents)
        .bind(wallet_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            wallet_id = %wallet_id,
            transaction_id = %record.id,
            tx_type = %tx_type,
            amount_cents = accepted_cents,
            fee_cents = fee_cents,
            "Recorded wallet transaction"
        );

        if let Err(e) = self
            .audit
            .log_event(
                AuditEvent::new("transaction.create", "wallet_transaction", record.id)
                    .actor_opt(actor_id, ActorType::User)
                    .after(serde_json::json!({
                        "wallet_id": wallet_id,
                        "tx_type": tx_type.as_str(),
                        "amount_cents": accepted_cents,
                        "fee_cents": fee_cents,
                        "requested_cents": amount_cents,
                    })),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log transaction audit event");
        }

        Ok(record)
    }

    /// Summarized wallet state for the current calendar month.
    pub async fn get_wallet_summary(&self, wallet_id: Uuid) -> LedgerResult<WalletSummary> {
        let wallet = self.get_wallet(wallet_id).await?;
        let current_month = month_anchor(OffsetDateTime::now_utc());
        let (monthly_volume_cents, monthly_transactions) =
            wallet.aggregates().monthly_for(current_month);

        Ok(WalletSummary {
            wallet_id,
            balance_cents: wallet.balance_cents,
            total_deposits_cents: wallet.total_deposits_cents,
            total_withdrawals_cents: wallet.total_withdrawals_cents,
            total_fees_earned_cents: wallet.total_fees_earned_cents,
            monthly_transactions,
            monthly_volume_cents,
        })
    }

    /// Full transaction history for a wallet, oldest first.
    pub async fn list_transactions(&self, wallet_id: Uuid) -> LedgerResult<Vec<WalletTransaction>> {
        let rows: Vec<WalletTransaction> = sqlx::query_as(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM wallet_transactions
            WHERE wallet_id = $1
            ORDER BY entry_date, created_at
            "#
        ))
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Re-derive one wallet's aggregates from its transaction log and
    /// repair the stored row if it drifted. Holds the wallet row lock for
    /// the duration so the comparison is not torn by concurrent appends.
    pub async fn reconcile_wallet(&self, wallet_id: Uuid) -> LedgerResult<ReconcileReport> {
        let mut tx = self.pool.begin().await?;

        let wallet: Option<Wallet> = sqlx::query_as(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1 FOR UPDATE"
        ))
        .bind(wallet_id)
        .fetch_optional(&mut *tx)
        .await?;

        let wallet = wallet.ok_or_else(|| LedgerError::NotFound(format!("wallet {}", wallet_id)))?;

        let rows: Vec<WalletTransaction> = sqlx::query_as(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM wallet_transactions
            WHERE wallet_id = $1
            ORDER BY entry_date, created_at
            "#
        ))
        .bind(wallet_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            entries.push(row.entry().ok_or_else(|| {
                LedgerError::Validation(format!(
                    "transaction {} has unrecognized type '{}'",
                    row.id, row.tx_type
                ))
            })?);
        }

        let stored = wallet.aggregates();
        let expected = WalletAggregates::recompute(wallet.month_anchor, &entries);
        let drifted = stored != expected;
        let mut repaired = false;

        if drifted {
            tracing::error!(
                wallet_id = %wallet_id,
                stored_balance_cents = stored.balance_cents,
                expected_balance_cents = expected.balance_cents,
                "Wallet aggregate drift detected; repairing from transaction log"
            );

            sqlx::query(
                r#"
                UPDATE wallets SET
                    balance_cents = $1,
                    total_deposits_cents = $2,
                    total_withdrawals_cents = $3,
                    total_fees_earned_cents = $4,
                    monthly_volume_cents = $5,
                    monthly_tx_count = $6,
                    month_anchor = $7,
                    updated_at = NOW()
                WHERE id = $8
                "#,
            )
            .bind(expected.balance_cents)
            .bind(expected.total_deposits_cents)
            .bind(expected.total_withdrawals_cents)
            .bind(expected.total_fees_earned_cents)
            .bind(expected.monthly_volume_cents)
            .bind(expected.monthly_tx_count)
            .bind(expected.month_anchor)
            .bind(wallet_id)
            .execute(&mut *tx)
            .await?;
            repaired = true;
        }

        tx.commit().await?;

        Ok(ReconcileReport {
            wallet_id,
            drifted,
            repaired,
            stored,
            expected,
        })
    }

    /// Reconcile every wallet. Returns one report per wallet; callers log
    /// the drift count.
    pub async fn reconcile_all(&self) -> LedgerResult<Vec<ReconcileReport>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM wallets ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        let mut reports = Vec::with_capacity(ids.len());
        for (wallet_id,) in ids {
            reports.push(self.reconcile_wallet(wallet_id).await?);
        }

        Ok(reports)
    }
}
