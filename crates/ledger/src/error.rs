//! Ledger error taxonomy.
//!
//! Typed errors cross the core boundary; the transport layer (out of scope
//! here) maps them to wire responses. Storage failures are folded into
//! `Database` with their message — surfaced, logged, never silently
//! swallowed.

use uuid::Uuid;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed or semantically invalid input, including an unrecognized
    /// fee policy tag on a stored wallet row.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Archived wallets are excluded from new activity.
    #[error("Wallet {0} is archived")]
    WalletArchived(Uuid),

    /// Monthly cap guard rejection. State-dependent, not input-dependent,
    /// so it is distinct from `Validation`.
    #[error("Monthly cap reached: requested {requested_cents} cents with {remaining_cents} cents remaining")]
    LimitExceeded {
        requested_cents: i64,
        remaining_cents: i64,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}
