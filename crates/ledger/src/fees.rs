//! Fee Policy Evaluator.
//!
//! A wallet's fee configuration is a closed tagged variant. Rows carry a
//! text tag plus the rate columns; parsing is fail-closed — an unrecognized
//! tag or a negative rate rejects the transaction instead of defaulting to a
//! zero fee.
//!
//! All money is `i64` cents. Percentage rates are basis points, so a 1% fee
//! is `rate_bps = 100`.

use serde::Serialize;

/// A per-thousand block is 1,000 whole currency units.
pub const PER_THOUSAND_BLOCK_CENTS: i64 = 100_000;

/// How a wallet charges fees on transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeePolicy {
    /// `fee = amount * rate_bps / 10_000`, rounded half up.
    Percentage { rate_bps: i64 },
    /// `fee = ceil(amount / 1000 units) * per_block_cents` — a started
    /// block incurs a full block's fee.
    PerThousand { per_block_cents: i64 },
    /// Flat fee per transaction.
    Fixed { amount_cents: i64 },
}

impl FeePolicy {
    /// Uncapped fee for a positive amount.
    pub fn fee_for_amount(&self, amount_cents: i64) -> i64 {
        match *self {
            FeePolicy::Percentage { rate_bps } => (amount_cents * rate_bps + 5_000) / 10_000,
            FeePolicy::PerThousand { per_block_cents } => {
                let blocks =
                    (amount_cents + PER_THOUSAND_BLOCK_CENTS - 1) / PER_THOUSAND_BLOCK_CENTS;
                blocks * per_block_cents
            }
            FeePolicy::Fixed { amount_cents: fee } => fee,
        }
    }
}

/// A wallet's full fee configuration: the policy plus an optional cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeSchedule {
    pub policy: FeePolicy,
    /// Caps the computed fee when positive; `0` means uncapped.
    pub max_fee_cents: i64,
}

impl FeeSchedule {
    /// Reconstruct a schedule from stored wallet columns.
    ///
    /// Returns `None` for an unknown tag or a negative rate/cap — the
    /// caller must reject the transaction.
    pub fn from_columns(
        fee_type: &str,
        fee_percent_bps: i64,
        fee_per_thousand_cents: i64,
        fee_fixed_cents: i64,
        max_fee_cents: i64,
    ) -> Option<Self> {
        if max_fee_cents < 0 {
            return None;
        }
        let policy = match fee_type {
            "percentage" if fee_percent_bps >= 0 => FeePolicy::Percentage {
                rate_bps: fee_percent_bps,
            },
            "per_thousand" if fee_per_thousand_cents >= 0 => FeePolicy::PerThousand {
                per_block_cents: fee_per_thousand_cents,
            },
            "fixed" if fee_fixed_cents >= 0 => FeePolicy::Fixed {
                amount_cents: fee_fixed_cents,
            },
            _ => return None,
        };
        Some(Self {
            policy,
            max_fee_cents,
        })
    }

    /// Tag stored in the wallet row for this schedule's policy.
    pub fn fee_type_tag(&self) -> &'static str {
        match self.policy {
            FeePolicy::Percentage { .. } => "percentage",
            FeePolicy::PerThousand { .. } => "per_thousand",
            FeePolicy::Fixed { .. } => "fixed",
        }
    }

    /// Capped, non-negative fee for a positive amount.
    pub fn fee_for_amount(&self, amount_cents: i64) -> i64 {
        let fee = self.policy.fee_for_amount(amount_cents).max(0);
        if self.max_fee_cents > 0 {
            fee.min(self.max_fee_cents)
        } else {
            fee
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(policy: FeePolicy, max_fee_cents: i64) -> FeeSchedule {
        FeeSchedule {
            policy,
            max_fee_cents,
        }
    }

    #[test]
    fn percentage_fee_is_rate_over_amount() {
        // 1% of 1,000.00 units = 10.00 units
        let s = schedule(FeePolicy::Percentage { rate_bps: 100 }, 0);
        assert_eq!(s.fee_for_amount(100_000), 1_000);
    }

    #[test]
    fn percentage_fee_rounds_half_up() {
        // 0.25% of 1.01 units: 101 * 25 / 10_000 = 0.2525 cents -> 0
        let s = schedule(FeePolicy::Percentage { rate_bps: 25 }, 0);
        assert_eq!(s.fee_for_amount(101), 0);
        // 2.5% of 0.21 units: 21 * 250 = 5250 -> rounds up to 1 cent
        let s = schedule(FeePolicy::Percentage { rate_bps: 250 }, 0);
        assert_eq!(s.fee_for_amount(21), 1);
    }

    #[test]
    fn per_thousand_charges_full_fee_for_partial_block() {
        // amount = 1 unit, 5 units per block -> one started block
        let s = schedule(
            FeePolicy::PerThousand {
                per_block_cents: 500,
            },
            0,
        );
        assert_eq!(s.fee_for_amount(100), 500);
    }

    #[test]
    fn per_thousand_block_boundaries() {
        let s = schedule(
            FeePolicy::PerThousand {
                per_block_cents: 500,
            },
            0,
        );
        // exactly 1000 units -> one block
        assert_eq!(s.fee_for_amount(100_000), 500);
        // 1001 units -> two blocks
        assert_eq!(s.fee_for_amount(100_100), 1_000);
    }

    #[test]
    fn fixed_fee_ignores_amount() {
        let s = schedule(FeePolicy::Fixed { amount_cents: 250 }, 0);
        assert_eq!(s.fee_for_amount(1), 250);
        assert_eq!(s.fee_for_amount(10_000_000), 250);
    }

    #[test]
    fn max_fee_caps_every_policy() {
        // 1% of 6,000.00 units = 60.00, capped at 50.00
        let s = schedule(FeePolicy::Percentage { rate_bps: 100 }, 5_000);
        assert_eq!(s.fee_for_amount(600_000), 5_000);

        let s = schedule(
            FeePolicy::PerThousand {
                per_block_cents: 500,
            },
            300,
        );
        assert_eq!(s.fee_for_amount(500_000), 300);

        let s = schedule(FeePolicy::Fixed { amount_cents: 900 }, 400);
        assert_eq!(s.fee_for_amount(100), 400);
    }

    #[test]
    fn zero_max_means_uncapped() {
        let s = schedule(FeePolicy::Percentage { rate_bps: 100 }, 0);
        assert_eq!(s.fee_for_amount(600_000), 6_000);
    }

    #[test]
    fn fee_is_bounded() {
        // 0 <= fee <= max for a spread of amounts and policies
        let policies = [
            FeePolicy::Percentage { rate_bps: 150 },
            FeePolicy::PerThousand {
                per_block_cents: 750,
            },
            FeePolicy::Fixed { amount_cents: 425 },
        ];
        for policy in policies {
            for amount in [1, 99, 100_000, 100_001, 5_000_000] {
                let s = schedule(policy, 600);
                let fee = s.fee_for_amount(amount);
                assert!(fee >= 0);
                assert!(fee <= 600);
            }
        }
    }

    #[test]
    fn unknown_tag_fails_closed() {
        assert!(FeeSchedule::from_columns("tiered", 100, 0, 0, 0).is_none());
        assert!(FeeSchedule::from_columns("", 100, 0, 0, 0).is_none());
    }

    #[test]
    fn negative_rates_fail_closed() {
        assert!(FeeSchedule::from_columns("percentage", -1, 0, 0, 0).is_none());
        assert!(FeeSchedule::from_columns("per_thousand", 0, -500, 0, 0).is_none());
        assert!(FeeSchedule::from_columns("fixed", 0, 0, -1, 0).is_none());
        assert!(FeeSchedule::from_columns("percentage", 100, 0, 0, -1).is_none());
    }

    #[test]
    fn from_columns_picks_the_tagged_rate() {
        let s = FeeSchedule::from_columns("per_thousand", 9_999, 500, 9_999, 1_000).unwrap();
        assert_eq!(
            s.policy,
            FeePolicy::PerThousand {
                per_block_cents: 500
            }
        );
        assert_eq!(s.max_fee_cents, 1_000);
        assert_eq!(s.fee_type_tag(), "per_thousand");
    }
}
