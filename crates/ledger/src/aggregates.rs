//! Wallet aggregate state.
//!
//! The transaction log is the source of truth; the wallet row carries the
//! summarized fields. Updates are incremental — `apply` runs in the same
//! atomic step as the append — and must equal a full recompute from the log
//! at every observation point. `recompute` is the reference formula, used by
//! the reconciliation job to detect drift; it never runs on the hot path.

use brokerbooks_shared::TransactionType;
use serde::Serialize;
use time::{Date, Month, OffsetDateTime};

/// First day of the calendar month containing `ts`.
pub fn month_anchor(ts: OffsetDateTime) -> Date {
    let d = ts.date();
    d.replace_day(1).unwrap_or(d)
}

/// First day of the month after `anchor`.
pub fn next_month_anchor(anchor: Date) -> Date {
    let (year, month) = match anchor.month() {
        Month::December => (anchor.year() + 1, Month::January),
        m => (anchor.year(), m.next()),
    };
    Date::from_calendar_date(year, month, 1).unwrap_or(anchor)
}

/// The settled fields of one ledger entry, as the aggregate math sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub tx_type: TransactionType,
    pub amount_cents: i64,
    pub fee_cents: i64,
    pub entry_date: OffsetDateTime,
}

/// Summarized wallet state, derivable from the full transaction log.
///
/// Balance formula: deposits add their full amount; withdrawals subtract
/// amount plus fee. Fees on deposits are recorded as earned but do not
/// reduce the balance. Monthly counters follow the most recent month with
/// activity (`month_anchor`); an append in a later month resets them, and a
/// back-dated append into an earlier month leaves them untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalletAggregates {
    pub balance_cents: i64,
    pub total_deposits_cents: i64,
    pub total_withdrawals_cents: i64,
    pub total_fees_earned_cents: i64,
    pub monthly_volume_cents: i64,
    pub monthly_tx_count: i64,
    pub month_anchor: Date,
}

impl WalletAggregates {
    /// Zeroed aggregates anchored to `month_anchor`.
    pub fn new(month_anchor: Date) -> Self {
        Self {
            balance_cents: 0,
            total_deposits_cents: 0,
            total_withdrawals_cents: 0,
            total_fees_earned_cents: 0,
            monthly_volume_cents: 0,
            monthly_tx_count: 0,
            month_anchor,
        }
    }

    /// Fold one accepted entry into the aggregates.
    pub fn apply(&mut self, entry: &LedgerEntry) {
        match entry.tx_type {
            TransactionType::Deposit => {
                self.balance_cents += entry.amount_cents;
                self.total_deposits_cents += entry.amount_cents;
            }
            TransactionType::Withdrawal => {
                self.balance_cents -= entry.amount_cents + entry.fee_cents;
                self.total_withdrawals_cents += entry.amount_cents;
            }
        }
        self.total_fees_earned_cents += entry.fee_cents;

        let anchor = month_anchor(entry.entry_date);
        if anchor == self.month_anchor {
            self.monthly_volume_cents += entry.amount_cents;
            self.monthly_tx_count += 1;
        } else if anchor > self.month_anchor {
            self.month_anchor = anchor;
            self.monthly_volume_cents = entry.amount_cents;
            self.monthly_tx_count = 1;
        }
        // entries dated before the anchor month never touch the counters
    }

    /// Reference O(n) recompute: fold the whole log from zero.
    pub fn recompute<'a, I>(start_anchor: Date, entries: I) -> Self
    where
        I: IntoIterator<Item = &'a LedgerEntry>,
    {
        let mut agg = Self::new(start_anchor);
        for entry in entries {
            agg.apply(entry);
        }
        agg
    }

    /// Monthly (volume, count) as observed for `month`; zeros when the
    /// counters track a different month.
    pub fn monthly_for(&self, month: Date) -> (i64, i64) {
        if self.month_anchor == month {
            (self.monthly_volume_cents, self.monthly_tx_count)
        } else {
            (0, 0)
        }
    }
}
