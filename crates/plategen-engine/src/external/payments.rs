//! HTTP payment provider client (pull-based confirmation lookup).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{PaymentProvider, ProviderConfirmation, ProviderError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Checkout session as reported by the payment provider.
#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    payment_status: String,
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: SessionMetadata,
}

/// Session metadata carrying the purchased credit amount.
#[derive(Debug, Default, Deserialize)]
struct SessionMetadata {
    credits_amount: Option<String>,
}

/// Provider error response body.
#[derive(Debug, Deserialize)]
struct ProviderErrorResponse {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// HTTP client for querying the payment provider by session reference.
///
/// This is the pull-based confirmation path: given an `external_ref`, it
/// fetches the same `{external_ref, user_id, credits_granted}` triple that
/// the provider's push notifications deliver.
#[derive(Debug, Clone)]
pub struct HttpPaymentProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentProvider {
    /// Create a new payment provider client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn fetch_confirmation(
        &self,
        external_ref: &str,
    ) -> Result<ProviderConfirmation, ProviderError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                self.base_url, external_ref
            ))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(external_ref.to_string()));
        }

        if !status.is_success() {
            let message = response
                .json::<ProviderErrorResponse>()
                .await
                .map_or_else(|_| format!("HTTP {status}"), |body| body.error.message);

            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if session.payment_status != "paid" {
            return Err(ProviderError::Pending {
                external_ref: session.id,
                status: session.payment_status,
            });
        }

        let credits_granted = session
            .metadata
            .credits_amount
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok());

        Ok(ProviderConfirmation {
            external_ref: session.id,
            user_id: session.client_reference_id,
            credits_granted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_paid_session() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_1",
                "payment_status": "paid",
                "client_reference_id": "9f2c9f5e-7b1a-4f3d-9a44-1f2e3d4c5b6a",
                "metadata": { "credits_amount": "50" }
            })))
            .mount(&server)
            .await;

        let provider = HttpPaymentProvider::new(server.uri(), "sk_test");
        let confirmation = provider.fetch_confirmation("cs_1").await.unwrap();

        assert_eq!(confirmation.external_ref, "cs_1");
        assert_eq!(
            confirmation.user_id.as_deref(),
            Some("9f2c9f5e-7b1a-4f3d-9a44-1f2e3d4c5b6a")
        );
        assert_eq!(confirmation.credits_granted, Some(50));
    }

    #[tokio::test]
    async fn unpaid_session_is_pending() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_1",
                "payment_status": "unpaid"
            })))
            .mount(&server)
            .await;

        let provider = HttpPaymentProvider::new(server.uri(), "sk_test");
        let err = provider.fetch_confirmation("cs_1").await.unwrap_err();

        assert!(matches!(err, ProviderError::Pending { .. }));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = HttpPaymentProvider::new(server.uri(), "sk_test");
        let err = provider.fetch_confirmation("cs_missing").await.unwrap_err();

        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn session_without_metadata_reports_missing_credits() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_1",
                "payment_status": "paid",
                "client_reference_id": "9f2c9f5e-7b1a-4f3d-9a44-1f2e3d4c5b6a"
            })))
            .mount(&server)
            .await;

        let provider = HttpPaymentProvider::new(server.uri(), "sk_test");
        let confirmation = provider.fetch_confirmation("cs_1").await.unwrap();

        // Left for the reconciliation layer to reject as malformed.
        assert_eq!(confirmation.credits_granted, None);
    }
}
