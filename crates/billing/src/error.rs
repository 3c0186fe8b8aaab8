//! Billing error taxonomy.
//!
//! Typed errors cross the core boundary; the transport layer (out of scope)
//! maps them onto wire responses. Conflict-class variants carry the entity
//! so callers can decide whether to treat a repeat as fatal.

use uuid::Uuid;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Malformed or semantically invalid input (inactive package, archived
    /// customer, non-positive duration, unrecognized stored tag).
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// At most one subscription per customer may be trial or active.
    #[error("Customer already has a live subscription")]
    DuplicateActiveSubscription,

    /// Renew and cancel are forbidden on a cancelled subscription.
    #[error("Subscription {0} is already cancelled")]
    AlreadyCancelled(Uuid),

    /// Paid is terminal for invoices.
    #[error("Invoice {0} is already paid")]
    InvoiceAlreadyPaid(Uuid),

    /// Other business-invariant violations (e.g. archival gating).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        BillingError::Database(e.to_string())
    }
}

impl BillingError {
    /// Map a storage error from an insert that races the partial unique
    /// index on live subscriptions.
    pub(crate) fn from_subscription_insert(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                BillingError::DuplicateActiveSubscription
            }
            _ => BillingError::from(e),
        }
    }
}
