//! Monthly Limit Guard.
//!
//! Pure decision over (cap, month volume so far, requested amount). The
//! wallet service evaluates it while holding the wallet row lock, so the
//! read of the monthly total and the append are one atomic step.

use serde::Serialize;

/// Outcome of checking a candidate transaction against the monthly cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LimitDecision {
    /// The full requested amount fits under the cap.
    Allowed { amount_cents: i64 },
    /// Partial capacity: the amount is clamped to what remains. Clamping
    /// happens before fee computation.
    Clamped {
        amount_cents: i64,
        requested_cents: i64,
    },
    /// No capacity left this month.
    Rejected { remaining_cents: i64 },
}

impl LimitDecision {
    /// Evaluate the guard. `month_volume_cents` is the settled volume
    /// (deposits and withdrawals both count) for the transaction's calendar
    /// month.
    pub fn evaluate(cap_cents: i64, month_volume_cents: i64, requested_cents: i64) -> Self {
        let remaining = cap_cents - month_volume_cents;
        if remaining <= 0 {
            LimitDecision::Rejected {
                remaining_cents: remaining.max(0),
            }
        } else if requested_cents > remaining {
            LimitDecision::Clamped {
                amount_cents: remaining,
                requested_cents,
            }
        } else {
            LimitDecision::Allowed {
                amount_cents: requested_cents,
            }
        }
    }

    /// The amount the ledger may append, if any.
    pub fn accepted_amount(&self) -> Option<i64> {
        match *self {
            LimitDecision::Allowed { amount_cents } | LimitDecision::Clamped { amount_cents, .. } => {
                Some(amount_cents)
            }
            LimitDecision::Rejected { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: i64 = 20_000_000; // 200,000.00 units

    #[test]
    fn under_cap_passes_through() {
        let d = LimitDecision::evaluate(CAP, 0, 50_000);
        assert_eq!(d, LimitDecision::Allowed {
            amount_cents: 50_000
        });
        assert_eq!(d.accepted_amount(), Some(50_000));
    }

    #[test]
    fn partial_capacity_clamps_to_remaining() {
        // wallet at 199,500.00 of 200,000.00; requesting 1,000.00 clamps to 500.00
        let d = LimitDecision::evaluate(CAP, 19_950_000, 100_000);
        assert_eq!(
            d,
            LimitDecision::Clamped {
                amount_cents: 50_000,
                requested_cents: 100_000,
            }
        );
    }

    #[test]
    fn exhausted_cap_rejects() {
        let d = LimitDecision::evaluate(CAP, CAP, 1);
        assert_eq!(d, LimitDecision::Rejected { remaining_cents: 0 });
        assert_eq!(d.accepted_amount(), None);
    }

    #[test]
    fn overshot_cap_reports_zero_remaining() {
        // Drifted data can put the stored volume past the cap; the guard
        // still rejects and never reports negative capacity.
        let d = LimitDecision::evaluate(CAP, CAP + 12_345, 1);
        assert_eq!(d, LimitDecision::Rejected { remaining_cents: 0 });
    }

    #[test]
    fn exact_fit_is_allowed_not_clamped() {
        let d = LimitDecision::evaluate(CAP, CAP - 100_000, 100_000);
        assert_eq!(
            d,
            LimitDecision::Allowed {
                amount_cents: 100_000
            }
        );
        // next request has nothing left
        let d = LimitDecision::evaluate(CAP, CAP, 100);
        assert_eq!(d, LimitDecision::Rejected { remaining_cents: 0 });
    }

    #[test]
    fn accepted_volume_never_exceeds_cap() {
        // Any accepted sequence stays under the cap.
        let mut volume = 0_i64;
        for requested in [9_000_000, 9_000_000, 9_000_000, 5_000_000, 1] {
            if let Some(a) = LimitDecision::evaluate(CAP, volume, requested).accepted_amount() {
                volume += a;
            }
            assert!(volume <= CAP);
        }
        assert_eq!(volume, CAP);
    }
}
