// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Billing Core
//!
//! Tests critical boundary conditions in:
//! - Subscription terms (BILL-S01 to BILL-S06)
//! - Expiry derivation (BILL-E01 to BILL-E04)
//! - Invoice status and totals (BILL-I01 to BILL-I06)
//! - Customer expiry outlook (BILL-X01 to BILL-X04)

#[cfg(test)]
mod subscription_terms_tests {
    use crate::subscriptions::{auto_renew_for, initial_terms};
    use brokerbooks_shared::{PackageType, RenewalPolicy, SubscriptionStatus};
    use time::macros::datetime;
    use time::Duration;

    // =========================================================================
    // BILL-S01: Free package with 7-day trial - TRIAL, end = start + 7d,
    //           auto_renew = false
    // =========================================================================
    #[test]
    fn test_free_trial_reference_scenario() {
        let start = datetime!(2025-06-01 00:00 UTC);
        let terms = initial_terms(PackageType::Free, RenewalPolicy::Manual, 30, 7, start);

        assert_eq!(terms.status, SubscriptionStatus::Trial);
        assert_eq!(terms.end_date, start + Duration::days(7));
        assert!(!terms.auto_renew, "trials never auto-renew");
    }

    // =========================================================================
    // BILL-S02: Free package, zero trial days - straight to ACTIVE
    // =========================================================================
    #[test]
    fn test_free_without_trial_is_active() {
        let start = datetime!(2025-06-01 00:00 UTC);
        let terms = initial_terms(PackageType::Free, RenewalPolicy::Manual, 90, 0, start);

        assert_eq!(terms.status, SubscriptionStatus::Active);
        assert_eq!(terms.end_date, start + Duration::days(90));
    }

    // =========================================================================
    // BILL-S03: Paid auto-renewing package - ACTIVE with auto_renew
    // =========================================================================
    #[test]
    fn test_paid_auto_renew_default() {
        let start = datetime!(2025-06-01 00:00 UTC);
        let terms = initial_terms(PackageType::Paid, RenewalPolicy::AutoRenew, 30, 0, start);

        assert_eq!(terms.status, SubscriptionStatus::Active);
        assert!(terms.auto_renew);
    }

    // =========================================================================
    // BILL-S04: auto_renew is true ONLY for paid + auto_renew policy
    // =========================================================================
    #[test]
    fn test_auto_renew_matrix() {
        assert!(auto_renew_for(PackageType::Paid, RenewalPolicy::AutoRenew));
        assert!(!auto_renew_for(PackageType::Paid, RenewalPolicy::Manual));
        assert!(!auto_renew_for(PackageType::Free, RenewalPolicy::AutoRenew));
        assert!(!auto_renew_for(PackageType::Free, RenewalPolicy::Manual));
    }

    // =========================================================================
    // BILL-S05: one-day package - end is exactly start + 1d
    // =========================================================================
    #[test]
    fn test_minimum_duration() {
        let start = datetime!(2025-06-01 00:00 UTC);
        let terms = initial_terms(PackageType::Paid, RenewalPolicy::Manual, 1, 0, start);
        assert_eq!(terms.end_date, start + Duration::days(1));
    }

    // =========================================================================
    // BILL-S06: trial days on a paid package are ignored
    // =========================================================================
    #[test]
    fn test_paid_package_trial_days_ignored() {
        let start = datetime!(2025-06-01 00:00 UTC);
        let terms = initial_terms(PackageType::Paid, RenewalPolicy::AutoRenew, 30, 14, start);

        assert_eq!(terms.status, SubscriptionStatus::Active);
        assert_eq!(terms.end_date, start + Duration::days(30));
    }
}

#[cfg(test)]
mod expiry_derivation_tests {
    use crate::subscriptions::effective_status;
    use brokerbooks_shared::SubscriptionStatus;
    use time::macros::datetime;

    // =========================================================================
    // BILL-E01/E02: one second before end - live; one second after - expired
    // =========================================================================
    #[test]
    fn test_expiry_boundary_pair() {
        let end = datetime!(2025-06-30 12:00 UTC);

        assert_eq!(
            effective_status(
                SubscriptionStatus::Active,
                end,
                false,
                datetime!(2025-06-30 11:59:59 UTC)
            ),
            SubscriptionStatus::Active,
            "one second before end should still be active"
        );
        assert_eq!(
            effective_status(
                SubscriptionStatus::Active,
                end,
                false,
                datetime!(2025-06-30 12:00:01 UTC)
            ),
            SubscriptionStatus::Expired,
            "one second after end should read expired"
        );
    }

    // =========================================================================
    // BILL-E03: exactly at end - not yet expired (strict <)
    // =========================================================================
    #[test]
    fn test_exactly_at_end_not_expired() {
        let end = datetime!(2025-06-30 12:00 UTC);
        assert_eq!(
            effective_status(SubscriptionStatus::Trial, end, false, end),
            SubscriptionStatus::Trial
        );
    }

    // =========================================================================
    // BILL-E04: auto-renew keeps a lapsed subscription out of EXPIRED
    // =========================================================================
    #[test]
    fn test_auto_renew_blocks_derivation() {
        let end = datetime!(2025-06-30 12:00 UTC);
        let later = datetime!(2025-07-15 12:00 UTC);
        assert_eq!(
            effective_status(SubscriptionStatus::Active, end, true, later),
            SubscriptionStatus::Active
        );
    }
}

#[cfg(test)]
mod invoice_tests {
    use crate::invoices::{compute_totals, derive_metrics, effective_status, Invoice};
    use brokerbooks_shared::InvoiceStatus;
    use time::macros::datetime;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn invoice(status: &str, due: OffsetDateTime, total: i64) -> Invoice {
        let at = datetime!(2025-01-01 00:00 UTC);
        Invoice {
            id: Uuid::new_v4(),
            subscription_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            package_id: Uuid::new_v4(),
            issue_date: at,
            due_date: due,
            subtotal_cents: total,
            tax_cents: 0,
            total_cents: total,
            status: status.to_string(),
            paid_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    // =========================================================================
    // BILL-I01/I02: due-date boundary - due now is pending, past due is overdue
    // =========================================================================
    #[test]
    fn test_overdue_boundary_pair() {
        let due = datetime!(2025-02-01 00:00 UTC);

        assert_eq!(
            effective_status(InvoiceStatus::Pending, due, due),
            InvoiceStatus::Pending,
            "exactly at due date is not yet overdue"
        );
        assert_eq!(
            effective_status(InvoiceStatus::Pending, due, datetime!(2025-02-01 00:00:01 UTC)),
            InvoiceStatus::Overdue
        );
    }

    // =========================================================================
    // BILL-I03: paid is terminal regardless of due date
    // =========================================================================
    #[test]
    fn test_paid_is_terminal() {
        let due = datetime!(2025-02-01 00:00 UTC);
        assert_eq!(
            effective_status(InvoiceStatus::Paid, due, datetime!(2026-01-01 00:00 UTC)),
            InvoiceStatus::Paid
        );
    }

    // =========================================================================
    // BILL-I04: metrics report derived overdue without a stored flip
    // =========================================================================
    #[test]
    fn test_metrics_apply_derivation() {
        let now = datetime!(2025-03-15 00:00 UTC);
        let stale_pending = invoice("pending", datetime!(2025-03-01 00:00 UTC), 7_500);

        let metrics = derive_metrics([&stale_pending], now);
        assert_eq!(metrics.total_overdue_cents, 7_500);
        assert_eq!(metrics.total_pending_cents, 0);
        assert_eq!(metrics.overdue_count, 1);
    }

    // =========================================================================
    // BILL-I05: tax rounding - fractional cents round half up
    // =========================================================================
    #[test]
    fn test_tax_rounding() {
        // 8.75% of 0.99: 99 * 875 = 86625 -> 8.6625 cents -> 9
        let (tax, total) = compute_totals(99, 875);
        assert_eq!(tax, 9);
        assert_eq!(total, 108);
    }

    // =========================================================================
    // BILL-I06: empty invoice set yields zeroed metrics
    // =========================================================================
    #[test]
    fn test_empty_metrics() {
        let metrics = derive_metrics([], datetime!(2025-03-15 00:00 UTC));
        assert_eq!(metrics, Default::default());
    }
}

#[cfg(test)]
mod expiry_outlook_tests {
    use crate::customers::{days_until_expiry, is_expiring_soon};
    use time::macros::datetime;

    // =========================================================================
    // BILL-X01: 7-day window boundary - day 7 inside, 7d+1s outside
    // =========================================================================
    #[test]
    fn test_window_boundary_pair() {
        let now = datetime!(2025-05-01 00:00 UTC);

        assert!(is_expiring_soon(datetime!(2025-05-08 00:00 UTC), now, 7));
        assert!(!is_expiring_soon(
            datetime!(2025-05-08 00:00:01 UTC),
            now,
            7
        ));
    }

    // =========================================================================
    // BILL-X02: already past end - expired, never "expiring soon"
    // =========================================================================
    #[test]
    fn test_past_end_not_expiring_soon() {
        let now = datetime!(2025-05-01 00:00 UTC);
        assert!(!is_expiring_soon(datetime!(2025-04-28 00:00 UTC), now, 7));
    }

    // =========================================================================
    // BILL-X03: days_until_expiry is a ceiling
    // =========================================================================
    #[test]
    fn test_days_until_expiry_ceiling() {
        let now = datetime!(2025-05-01 00:00 UTC);

        assert_eq!(
            days_until_expiry(datetime!(2025-05-01 00:00:01 UTC), now),
            1,
            "any positive fraction of a day rounds up"
        );
        assert_eq!(days_until_expiry(datetime!(2025-05-08 00:00 UTC), now), 7);
    }

    // =========================================================================
    // BILL-X04: zero and negative distances
    // =========================================================================
    #[test]
    fn test_days_until_expiry_at_and_past_end() {
        let now = datetime!(2025-05-01 00:00 UTC);

        assert_eq!(days_until_expiry(now, now), 0);
        assert_eq!(days_until_expiry(datetime!(2025-04-29 00:00 UTC), now), -2);
    }
}
