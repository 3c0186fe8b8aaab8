//! Billing configuration.

/// Days between invoice issue and due date.
pub const DEFAULT_INVOICE_DUE_DAYS: i64 = 14;

/// Tax applied to invoice subtotals, in basis points. The field is carried
/// opaquely — tax-engine correctness is out of scope.
pub const DEFAULT_TAX_RATE_BPS: i64 = 0;

/// Window for flagging a subscription as expiring soon, in days.
pub const DEFAULT_EXPIRING_SOON_DAYS: i64 = 7;

/// Runtime configuration for subscriptions, invoices and the customer view.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub invoice_due_days: i64,
    pub tax_rate_bps: i64,
    pub expiring_soon_days: i64,
}

impl BillingConfig {
    /// Build from environment variables, falling back to defaults.
    ///
    /// `BILLING_INVOICE_DUE_DAYS`, `BILLING_TAX_RATE_BPS` and
    /// `BILLING_EXPIRING_SOON_DAYS` override the corresponding fields.
    pub fn from_env() -> Self {
        fn var_i64(name: &str, default: i64) -> i64 {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(default)
        }

        Self {
            invoice_due_days: var_i64("BILLING_INVOICE_DUE_DAYS", DEFAULT_INVOICE_DUE_DAYS),
            tax_rate_bps: var_i64("BILLING_TAX_RATE_BPS", DEFAULT_TAX_RATE_BPS),
            expiring_soon_days: var_i64("BILLING_EXPIRING_SOON_DAYS", DEFAULT_EXPIRING_SOON_DAYS),
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            invoice_due_days: DEFAULT_INVOICE_DUE_DAYS,
            tax_rate_bps: DEFAULT_TAX_RATE_BPS,
            expiring_soon_days: DEFAULT_EXPIRING_SOON_DAYS,
        }
    }
}
