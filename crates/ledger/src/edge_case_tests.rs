// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Wallet Ledger
//!
//! Covers the boundary interactions between the fee evaluator, the monthly
//! limit guard and the aggregate math:
//! - Fee policies (LED-F01 to LED-F06)
//! - Monthly cap (LED-C01 to LED-C05)
//! - Settlement flows composing guard + fee + aggregates (LED-S01 to LED-S04)

#[cfg(test)]
mod fee_policy_tests {
    use crate::fees::{FeePolicy, FeeSchedule};

    // =========================================================================
    // LED-F01: amount 1 unit with 5/block per-thousand - one started block
    // =========================================================================
    #[test]
    fn test_partial_block_charges_full_block() {
        let s = FeeSchedule {
            policy: FeePolicy::PerThousand {
                per_block_cents: 500,
            },
            max_fee_cents: 0,
        };
        assert_eq!(s.fee_for_amount(100), 500, "1 unit should cost one block");
    }

    // =========================================================================
    // LED-F02: amount 1000 units - still one block; 1001 units - two blocks
    // =========================================================================
    #[test]
    fn test_block_boundary_pair() {
        let s = FeeSchedule {
            policy: FeePolicy::PerThousand {
                per_block_cents: 500,
            },
            max_fee_cents: 0,
        };
        assert_eq!(s.fee_for_amount(100_000), 500, "1000 units = 1 block");
        assert_eq!(s.fee_for_amount(100_100), 1_000, "1001 units = 2 blocks");
    }

    // =========================================================================
    // LED-F03: cap exactly at computed fee - no clamping artifact
    // =========================================================================
    #[test]
    fn test_cap_equal_to_fee() {
        let s = FeeSchedule {
            policy: FeePolicy::Percentage { rate_bps: 100 },
            max_fee_cents: 1_000,
        };
        // 1% of 1000.00 = exactly the cap
        assert_eq!(s.fee_for_amount(100_000), 1_000);
    }

    // =========================================================================
    // LED-F04: unknown tag must reject, not default to zero fee
    // =========================================================================
    #[test]
    fn test_unknown_tag_is_not_zero_fee() {
        assert!(
            FeeSchedule::from_columns("progressive", 0, 0, 0, 0).is_none(),
            "unrecognized tag must fail closed"
        );
    }

    // =========================================================================
    // LED-F05: zero-rate policies are valid and produce zero fees
    // =========================================================================
    #[test]
    fn test_zero_rate_is_valid() {
        let s = FeeSchedule::from_columns("percentage", 0, 0, 0, 0).unwrap();
        assert_eq!(s.fee_for_amount(1_000_000), 0);
    }

    // =========================================================================
    // LED-F06: fixed fee larger than the cap is clamped
    // =========================================================================
    #[test]
    fn test_fixed_fee_clamped_by_cap() {
        let s = FeeSchedule::from_columns("fixed", 0, 0, 10_000, 2_500).unwrap();
        assert_eq!(s.fee_for_amount(100), 2_500);
    }
}

#[cfg(test)]
mod monthly_cap_tests {
    use crate::limits::LimitDecision;

    const CAP: i64 = 20_000_000;

    // =========================================================================
    // LED-C01: request exactly equal to remaining - allowed, not clamped
    // =========================================================================
    #[test]
    fn test_exact_remaining_allowed() {
        let d = LimitDecision::evaluate(CAP, CAP - 500, 500);
        assert_eq!(d, LimitDecision::Allowed { amount_cents: 500 });
    }

    // =========================================================================
    // LED-C02: request one cent over remaining - clamped by one cent
    // =========================================================================
    #[test]
    fn test_one_over_remaining_clamped() {
        let d = LimitDecision::evaluate(CAP, CAP - 500, 501);
        assert_eq!(
            d,
            LimitDecision::Clamped {
                amount_cents: 500,
                requested_cents: 501,
            }
        );
    }

    // =========================================================================
    // LED-C03: volume at cap - rejected with zero remaining
    // =========================================================================
    #[test]
    fn test_at_cap_rejected() {
        let d = LimitDecision::evaluate(CAP, CAP, 1);
        assert_eq!(d, LimitDecision::Rejected { remaining_cents: 0 });
    }

    // =========================================================================
    // LED-C04: reference scenario - 199,500 of 200,000; request 1,000 -> 500
    // =========================================================================
    #[test]
    fn test_reference_clamp_scenario() {
        let d = LimitDecision::evaluate(20_000_000, 19_950_000, 100_000);
        assert_eq!(d.accepted_amount(), Some(50_000));
    }

    // =========================================================================
    // LED-C05: deposits and withdrawals share one cap
    // =========================================================================
    #[test]
    fn test_mixed_directions_share_cap() {
        let mut volume = 0_i64;
        // alternating directions; only the amounts count toward volume
        for requested in [8_000_000_i64, 8_000_000, 8_000_000] {
            if let Some(a) = LimitDecision::evaluate(CAP, volume, requested).accepted_amount() {
                volume += a;
            }
        }
        assert_eq!(volume, CAP, "third request is clamped to the last 4M");
        assert_eq!(
            LimitDecision::evaluate(CAP, volume, 1),
            LimitDecision::Rejected { remaining_cents: 0 }
        );
    }
}

#[cfg(test)]
mod settlement_flow_tests {
    use crate::aggregates::{LedgerEntry, WalletAggregates};
    use crate::fees::{FeePolicy, FeeSchedule};
    use crate::limits::LimitDecision;
    use brokerbooks_shared::TransactionType;
    use time::macros::{date, datetime};
    use time::OffsetDateTime;

    const CAP: i64 = 20_000_000;

    /// The service's accept path, composed from the pure pieces: guard,
    /// then fee on the clamped amount, then aggregate application.
    fn settle(
        agg: &mut WalletAggregates,
        schedule: &FeeSchedule,
        tx_type: TransactionType,
        requested_cents: i64,
        at: OffsetDateTime,
    ) -> Option<(i64, i64)> {
        let (volume, _) = agg.monthly_for(crate::aggregates::month_anchor(at));
        let accepted = LimitDecision::evaluate(CAP, volume, requested_cents).accepted_amount()?;
        let fee = schedule.fee_for_amount(accepted);
        agg.apply(&LedgerEntry {
            tx_type,
            amount_cents: accepted,
            fee_cents: fee,
            entry_date: at,
        });
        Some((accepted, fee))
    }

    // =========================================================================
    // LED-S01: percentage wallet, 1% capped at 50.00
    //   deposit 1,000.00 -> fee 10.00, balance +1,000.00
    //   withdraw 6,000.00 -> fee min(60, 50) = 50.00, balance -6,050.00
    // =========================================================================
    #[test]
    fn test_percentage_wallet_end_to_end() {
        let schedule = FeeSchedule {
            policy: FeePolicy::Percentage { rate_bps: 100 },
            max_fee_cents: 5_000,
        };
        let mut agg = WalletAggregates::new(date!(2025 - 05 - 01));

        let (amount, fee) = settle(
            &mut agg,
            &schedule,
            TransactionType::Deposit,
            100_000,
            datetime!(2025-05-02 10:00 UTC),
        )
        .unwrap();
        assert_eq!((amount, fee), (100_000, 1_000));
        assert_eq!(agg.balance_cents, 100_000);

        let (amount, fee) = settle(
            &mut agg,
            &schedule,
            TransactionType::Withdrawal,
            600_000,
            datetime!(2025-05-03 10:00 UTC),
        )
        .unwrap();
        assert_eq!((amount, fee), (600_000, 5_000));
        assert_eq!(agg.balance_cents, 100_000 - 605_000);
        assert_eq!(agg.total_fees_earned_cents, 6_000);
    }

    // =========================================================================
    // LED-S02: a clamped transaction pays fees on the clamped amount
    // =========================================================================
    #[test]
    fn test_clamped_amount_drives_fee() {
        let schedule = FeeSchedule {
            policy: FeePolicy::Percentage { rate_bps: 100 },
            max_fee_cents: 0,
        };
        let mut agg = WalletAggregates::new(date!(2025 - 05 - 01));
        // fill the month to 199,500.00
        settle(
            &mut agg,
            &schedule,
            TransactionType::Deposit,
            19_950_000,
            datetime!(2025-05-02 10:00 UTC),
        )
        .unwrap();

        let (amount, fee) = settle(
            &mut agg,
            &schedule,
            TransactionType::Deposit,
            100_000,
            datetime!(2025-05-03 10:00 UTC),
        )
        .unwrap();
        assert_eq!(amount, 50_000, "clamped to the remaining 500.00");
        assert_eq!(fee, 500, "1% of the clamped amount, not the requested");
    }

    // =========================================================================
    // LED-S03: once the cap is exhausted the month stays closed
    // =========================================================================
    #[test]
    fn test_month_closes_after_cap() {
        let schedule = FeeSchedule {
            policy: FeePolicy::Fixed { amount_cents: 0 },
            max_fee_cents: 0,
        };
        let mut agg = WalletAggregates::new(date!(2025 - 05 - 01));
        settle(
            &mut agg,
            &schedule,
            TransactionType::Deposit,
            CAP,
            datetime!(2025-05-02 10:00 UTC),
        )
        .unwrap();

        assert!(settle(
            &mut agg,
            &schedule,
            TransactionType::Deposit,
            1,
            datetime!(2025-05-20 10:00 UTC),
        )
        .is_none());

        // a new month reopens capacity
        assert!(settle(
            &mut agg,
            &schedule,
            TransactionType::Deposit,
            1,
            datetime!(2025-06-01 10:00 UTC),
        )
        .is_some());
    }

    // =========================================================================
    // LED-S04: incremental aggregates equal full recompute across a mixed run
    // =========================================================================
    #[test]
    fn test_settled_run_matches_recompute() {
        let schedule = FeeSchedule {
            policy: FeePolicy::PerThousand {
                per_block_cents: 250,
            },
            max_fee_cents: 2_000,
        };
        let mut agg = WalletAggregates::new(date!(2025 - 05 - 01));
        let mut log: Vec<LedgerEntry> = Vec::new();

        let run = [
            (TransactionType::Deposit, 120_000_i64),
            (TransactionType::Withdrawal, 90_001),
            (TransactionType::Deposit, 1),
            (TransactionType::Withdrawal, 100_000),
        ];
        let at = datetime!(2025-05-10 12:00 UTC);
        for (tx_type, requested) in run {
            let (volume, _) = agg.monthly_for(date!(2025 - 05 - 01));
            let accepted = LimitDecision::evaluate(CAP, volume, requested)
                .accepted_amount()
                .unwrap();
            let fee = schedule.fee_for_amount(accepted);
            let entry = LedgerEntry {
                tx_type,
                amount_cents: accepted,
                fee_cents: fee,
                entry_date: at,
            };
            agg.apply(&entry);
            log.push(entry);

            assert_eq!(agg, WalletAggregates::recompute(date!(2025 - 05 - 01), &log));
        }
    }
}
