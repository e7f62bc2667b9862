//! External collaborator contracts.
//!
//! The core consumes four external capabilities through trait objects:
//! menu extraction, image generation, asset storage, and payment
//! verification. Production implementations live in [`generator`] and
//! [`payments`]; tests substitute scripted doubles.

pub mod generator;
pub mod payments;

use std::time::Duration;

use async_trait::async_trait;

pub use generator::HttpImageGenerator;
pub use payments::HttpPaymentProvider;

/// One dish extracted from a menu photo.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct MenuItem {
    /// Dish name.
    pub name: String,

    /// Price as printed on the menu, if legible.
    pub price: Option<String>,

    /// Menu description of the dish, if any.
    pub description: Option<String>,
}

/// A generated image, not yet durably stored.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    /// Raw image bytes.
    pub data: Vec<u8>,

    /// MIME type reported by the generator.
    pub content_type: String,
}

/// Errors from the image generator.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// The provider rejected the call for rate-limit reasons, optionally
    /// mandating a wait before the next attempt.
    #[error("generator rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Provider-mandated wait, when the response carried one.
        retry_after: Option<Duration>,
    },

    /// The provider returned an API error.
    #[error("generator API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The request never completed.
    #[error("generator network error: {0}")]
    Network(String),
}

impl GeneratorError {
    /// The provider-mandated wait for this failure, if any. Fed to the
    /// retry wrapper as the backoff override hint.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            Self::Api { .. } | Self::Network(_) => None,
        }
    }
}

/// Errors from the asset store.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// The sink was unreachable.
    #[error("asset store unreachable: {0}")]
    Unreachable(String),

    /// The sink rejected the upload.
    #[error("asset store rejected upload: {status} - {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },
}

/// Errors from the vision/extraction service.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The service returned an API error.
    #[error("extraction API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The request never completed.
    #[error("extraction network error: {0}")]
    Network(String),

    /// The response could not be interpreted as a menu.
    #[error("unparseable extraction response: {0}")]
    Unparseable(String),
}

/// Errors from the payment provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No payment with this reference exists.
    #[error("payment not found: {0}")]
    NotFound(String),

    /// The payment exists but has not completed yet. Retriable later.
    #[error("payment {external_ref} not settled yet (status: {status})")]
    Pending {
        /// The payment reference.
        external_ref: String,
        /// Provider-reported status.
        status: String,
    },

    /// The provider returned an API error.
    #[error("payment provider API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The request never completed.
    #[error("payment provider network error: {0}")]
    Network(String),
}

/// The raw confirmation triple a payment provider reports for a reference.
///
/// Fields other than the reference are optional on the wire; validation
/// into a `PaymentConfirmation` is where malformed events are rejected.
#[derive(Debug, Clone)]
pub struct ProviderConfirmation {
    /// Globally unique payment reference.
    pub external_ref: String,

    /// The paying user, as reported by the provider.
    pub user_id: Option<String>,

    /// Credits purchased, as reported by the provider.
    pub credits_granted: Option<i64>,
}

/// Vision service turning a menu photo into dish entries.
///
/// Extraction failures are not metered; callers retry at their discretion
/// before any batch job is created.
#[async_trait]
pub trait MenuExtractor: Send + Sync {
    /// Extract dish entries from the image behind `image_ref`.
    async fn extract(&self, image_ref: &str) -> Result<Vec<MenuItem>, ExtractError>;
}

/// The expensive, rate-limited image generator.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image for a dish description.
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GeneratorError>;
}

/// Durable sink for generated image bytes.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store the image and return its durable URL.
    async fn store(&self, name: &str, image: &GeneratedImage) -> Result<String, AssetError>;
}

/// Pull-based payment confirmation lookup.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Fetch the confirmation triple for a settled payment.
    async fn fetch_confirmation(
        &self,
        external_ref: &str,
    ) -> Result<ProviderConfirmation, ProviderError>;
}
