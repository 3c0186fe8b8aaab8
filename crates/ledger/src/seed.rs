//! Sample-transaction generator.
//!
//! Back-fills a wallet with random deposits and withdrawals over a date
//! range. Test-data only — not part of the production interface. Entries go
//! through `create_transaction`, so fee policy and the monthly cap apply
//! exactly as they would for real activity; once a month's cap is exhausted
//! the remaining candidates for that month are counted as skipped.

use rand::Rng;
use time::{Date, Time};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::wallet::WalletService;
use brokerbooks_shared::TransactionType;

/// Parameters for a seeding run.
#[derive(Debug, Clone)]
pub struct SeedSpec {
    pub wallet_id: Uuid,
    /// First entry date, inclusive.
    pub start: Date,
    /// Last entry date, inclusive.
    pub end: Date,
    /// Candidate transactions per day.
    pub per_day: u32,
    /// Upper bound for generated amounts, in cents.
    pub max_amount_cents: i64,
    /// Attribution for the audit trail.
    pub actor_id: Option<Uuid>,
}

/// Counts from a seeding run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedOutcome {
    pub created: u64,
    /// Candidates rejected by the monthly cap.
    pub skipped: u64,
}

/// Generate sample transactions for one wallet.
pub async fn seed_wallet(service: &WalletService, spec: &SeedSpec) -> LedgerResult<SeedOutcome> {
    if spec.end < spec.start {
        return Err(LedgerError::Validation(
            "seed range end precedes start".into(),
        ));
    }
    if spec.max_amount_cents <= 0 {
        return Err(LedgerError::Validation(
            "seed max amount must be positive".into(),
        ));
    }

    let mut rng = rand::rng();
    let mut outcome = SeedOutcome::default();
    let mut day = spec.start;

    loop {
        for _ in 0..spec.per_day {
            let amount_cents = rng.random_range(100..=spec.max_amount_cents);
            let tx_type = if rng.random_bool(0.6) {
                TransactionType::Deposit
            } else {
                TransactionType::Withdrawal
            };
            let entry_date = day.with_time(Time::MIDNIGHT).assume_utc();
            let description = format!("sample {}", tx_type);

            match service
                .create_transaction(
                    spec.wallet_id,
                    tx_type,
                    amount_cents,
                    &description,
                    entry_date,
                    spec.actor_id,
                )
                .await
            {
                Ok(_) => outcome.created += 1,
                Err(LedgerError::LimitExceeded { .. }) => outcome.skipped += 1,
                Err(e) => return Err(e),
            }
        }

        if day >= spec.end {
            break;
        }
        match day.next_day() {
            Some(next) => day = next,
            None => break,
        }
    }

    tracing::info!(
        wallet_id = %spec.wallet_id,
        created = outcome.created,
        skipped = outcome.skipped,
        "Seeded sample transactions"
    );

    Ok(outcome)
}
