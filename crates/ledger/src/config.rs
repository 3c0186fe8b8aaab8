//! Ledger configuration.

/// Default per-wallet calendar-month cap: 200,000.00 currency units.
pub const DEFAULT_MONTHLY_CAP_CENTS: i64 = 20_000_000;

/// Runtime configuration for the wallet ledger.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Maximum cumulative transacted volume (deposits and withdrawals both
    /// count) permitted per wallet per calendar month, in cents.
    pub monthly_cap_cents: i64,
}

impl LedgerConfig {
    /// Build from environment variables, falling back to defaults.
    ///
    /// `LEDGER_MONTHLY_CAP_CENTS` overrides the monthly cap.
    pub fn from_env() -> Self {
        let monthly_cap_cents = std::env::var("LEDGER_MONTHLY_CAP_CENTS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_MONTHLY_CAP_CENTS);

        Self { monthly_cap_cents }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            monthly_cap_cents: DEFAULT_MONTHLY_CAP_CENTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cap_is_200k_units() {
        assert_eq!(LedgerConfig::default().monthly_cap_cents, 20_000_000);
    }
}
