//! Error types for the storage layer.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The entity kind (account, job, ...).
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A debit would have driven an account balance negative. The settlement
    /// is aborted and nothing is written.
    #[error("invariant violation for {user_id}: balance={balance}, attempted debit={attempted}")]
    InvariantViolation {
        /// The affected user.
        user_id: String,
        /// Balance at settlement time.
        balance: i64,
        /// The refused debit amount.
        attempted: i64,
    },

    /// Database error.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for plategen_core::CreditError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvariantViolation {
                user_id,
                balance,
                attempted,
            } => Self::LedgerInvariantViolation {
                user_id,
                balance,
                attempted,
            },
            other => Self::Storage(other.to_string()),
        }
    }
}
