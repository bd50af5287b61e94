use uuid::Uuid;

use thiserror::Error;

use crate::types::BookingStatus;

pub type MarketResult<T> = Result<T, MarketError>;

/// Typed error taxonomy for all core operations. Every operation returns a
/// `MarketResult` rather than letting panics or opaque errors cross component
/// boundaries.
#[derive(Error, Debug)]
pub enum MarketError {
    /// Attempted transition not legal from the current status. No mutation
    /// occurred; the caller can surface this directly as a rejected action.
    #[error("state violation: '{action}' is not legal from {from:?}")]
    StateViolation {
        from: BookingStatus,
        action: &'static str,
    },

    /// Installation attempted after the window closed. Recovered only by the
    /// scheduled sweep cancelling the booking with a refund.
    #[error("installation window for booking {booking_id} closed {days_since_closed} day(s) ago")]
    WindowClosed {
        booking_id: Uuid,
        days_since_closed: i64,
    },

    /// Installation attempted before the window opened.
    #[error("installation window for booking {booking_id} opens in {days_until_open} day(s)")]
    WindowNotOpen {
        booking_id: Uuid,
        days_until_open: i64,
    },

    /// Malformed input; local, no state change.
    #[error("validation error: {0}")]
    Validation(String),

    /// A capture/refund/transfer call failed. Recorded on the relevant
    /// payout/refund record, surfaced for manual review.
    #[error("payment failure: {0}")]
    Payment(String),

    /// Version mismatch on save. Reload and retry from fresh state, never
    /// blindly overwrite.
    #[error("concurrent modification of {entity} {id}: expected version {expected}, found {found}")]
    ConcurrencyConflict {
        entity: &'static str,
        id: Uuid,
        expected: u64,
        found: u64,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// A dispute can be resolved exactly once.
    #[error("dispute {0} is already resolved")]
    AlreadyResolved(Uuid),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
