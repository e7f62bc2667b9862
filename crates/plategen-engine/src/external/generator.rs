//! HTTP image generator client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{GeneratedImage, GeneratorError, ImageGenerator};

/// Request timeout. Generation is slow; this bounds a single attempt, not
/// the whole retry schedule.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Generation request body.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    size: &'a str,
}

/// HTTP client for the external image-generation API.
///
/// The API returns the image bytes directly on success. Rate-limit
/// responses (HTTP 429) may carry a `retry-after` header in seconds, which
/// is surfaced through [`GeneratorError::retry_after`] for the retry
/// wrapper to honor.
#[derive(Debug, Clone)]
pub struct HttpImageGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    image_size: String,
}

impl HttpImageGenerator {
    /// Create a new generator client.
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
            image_size: "1024x1024".into(),
        }
    }

    /// Override the generated image size.
    #[must_use]
    pub fn with_image_size(mut self, size: impl Into<String>) -> Self {
        self.image_size = size.into();
        self
    }

    /// Parse a `retry-after` header value (delay-seconds form).
    fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GeneratorError> {
        let response = self
            .client
            .post(format!("{}/v1/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&GenerateRequest {
                prompt,
                size: &self.image_size,
            })
            .send()
            .await
            .map_err(|e| GeneratorError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = Self::parse_retry_after(&response);
            tracing::debug!(
                retry_after = ?retry_after,
                "Generator rate limited"
            );
            return Err(GeneratorError::RateLimited { retry_after });
        }

        if !status.is_success() {
            // Try to parse a structured error body, fall back to the status.
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| {
                    body.get("error")?
                        .get("message")?
                        .as_str()
                        .map(String::from)
                })
                .unwrap_or_else(|| format!("HTTP {status}"));

            return Err(GeneratorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| GeneratorError::Network(e.to_string()))?
            .to_vec();

        Ok(GeneratedImage { data, content_type })
    }
}
