//! Error types for plategen.

use crate::ids::IdError;

/// Result type for plategen domain operations.
pub type Result<T> = std::result::Result<T, CreditError>;

/// Errors that can occur in plategen metering operations.
#[derive(Debug, thiserror::Error)]
pub enum CreditError {
    /// Insufficient credits for the requested work. Permanent for this
    /// attempt; the user must top up first.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance in credits.
        balance: i64,
        /// Required amount in credits.
        required: i64,
    },

    /// A debit would have driven an account balance negative. Indicates an
    /// internal bug or an extreme race; the settlement is aborted and no
    /// transaction is written.
    #[error("ledger invariant violation for {user_id}: balance={balance}, attempted debit={attempted}")]
    LedgerInvariantViolation {
        /// The affected user.
        user_id: String,
        /// Balance at settlement time.
        balance: i64,
        /// The debit that was refused.
        attempted: i64,
    },

    /// A batch request carried zero extracted items. Permanent, zero cost.
    #[error("no work extracted from menu")]
    NoWorkExtracted,

    /// A payment confirmation was missing or carried unparseable fields.
    /// Permanent; requires manual reconciliation.
    #[error("malformed payment event: {reason}")]
    MalformedPaymentEvent {
        /// What was wrong with the event.
        reason: String,
    },

    /// Job not found.
    #[error("job not found: {job_id}")]
    JobNotFound {
        /// The job ID that was not found.
        job_id: String,
    },

    /// Job item not found.
    #[error("job item not found: {job_id}[{index}]")]
    JobItemNotFound {
        /// The owning job.
        job_id: String,
        /// The missing item index.
        index: u32,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),
}
