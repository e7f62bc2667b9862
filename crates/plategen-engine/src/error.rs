//! Error types for the engine.

use plategen_core::CreditError;
use plategen_store::StoreError;

use crate::external::{ExtractError, ProviderError};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by orchestration and reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A domain error (insufficient credits, invariant violation, ...).
    #[error(transparent)]
    Credit(#[from] CreditError),

    /// A storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Menu extraction failed before any job was created. Not metered.
    #[error("menu extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    /// The payment provider could not confirm a payment. Retriable unless
    /// the payment does not exist.
    #[error("payment verification failed: {0}")]
    Provider(#[from] ProviderError),

    /// A job processing task died without reporting.
    #[error("job task failed: {0}")]
    Task(String),
}

impl EngineError {
    /// Whether the caller may usefully retry the same request later.
    ///
    /// Permanent failures (insufficient credits, malformed payment events,
    /// empty batches) need user action or manual reconciliation instead.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Credit(
                CreditError::InsufficientCredits { .. }
                | CreditError::NoWorkExtracted
                | CreditError::MalformedPaymentEvent { .. }
                | CreditError::JobNotFound { .. }
                | CreditError::JobItemNotFound { .. }
                | CreditError::InvalidId(_),
            )
            | Self::Provider(ProviderError::NotFound(_)) => false,
            Self::Credit(_) | Self::Store(_) | Self::Extraction(_) | Self::Provider(_) => true,
            Self::Task(_) => false,
        }
    }
}
