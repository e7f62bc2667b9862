//! Engine configuration.

use std::time::Duration;

use plategen_core::PricingConfig;

use crate::retry::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};

/// Default number of generator calls in flight across all jobs. Bounded by
/// the provider's effective rate limit, not by batch size.
pub const DEFAULT_MAX_CONCURRENT_GENERATIONS: usize = 4;

/// Default minimum spacing between generator calls, in milliseconds.
pub const DEFAULT_MIN_CALL_SPACING_MS: u64 = 250;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the `RocksDB` data directory (default: "/data/plategen").
    pub data_dir: String,

    /// Per-unit credit costs.
    pub pricing: PricingConfig,

    /// Retry attempts per generation unit.
    pub retry_max_attempts: u32,

    /// Base backoff delay in milliseconds; doubles per attempt.
    pub retry_base_delay_ms: u64,

    /// Cap on the computed backoff delay in milliseconds.
    pub retry_max_delay_ms: u64,

    /// Global bound on in-flight generator calls.
    pub max_concurrent_generations: usize,

    /// Global minimum spacing between generator calls in milliseconds.
    pub min_call_spacing_ms: u64,

    /// Image generator API base URL (optional).
    pub generator_api_url: Option<String>,

    /// Image generator API key (optional).
    pub generator_api_key: Option<String>,

    /// Payment provider API base URL (optional).
    pub payment_api_url: Option<String>,

    /// Payment provider API key (optional).
    pub payment_api_key: Option<String>,
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/plategen".into()),
            pricing: PricingConfig {
                single_image_credits: env_parse(
                    "SINGLE_IMAGE_CREDITS",
                    PricingConfig::default().single_image_credits,
                ),
                batch_item_credits: env_parse(
                    "BATCH_ITEM_CREDITS",
                    PricingConfig::default().batch_item_credits,
                ),
            },
            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
            retry_base_delay_ms: env_parse(
                "RETRY_BASE_DELAY_MS",
                u64::try_from(DEFAULT_BASE_DELAY.as_millis()).unwrap_or(500),
            ),
            retry_max_delay_ms: env_parse(
                "RETRY_MAX_DELAY_MS",
                u64::try_from(DEFAULT_MAX_DELAY.as_millis()).unwrap_or(30_000),
            ),
            max_concurrent_generations: env_parse(
                "MAX_CONCURRENT_GENERATIONS",
                DEFAULT_MAX_CONCURRENT_GENERATIONS,
            ),
            min_call_spacing_ms: env_parse("MIN_CALL_SPACING_MS", DEFAULT_MIN_CALL_SPACING_MS),
            generator_api_url: std::env::var("GENERATOR_API_URL").ok(),
            generator_api_key: std::env::var("GENERATOR_API_KEY").ok(),
            payment_api_url: std::env::var("PAYMENT_API_URL").ok(),
            payment_api_key: std::env::var("PAYMENT_API_KEY").ok(),
        }
    }

    /// The retry policy for generator calls.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    /// The minimum spacing between generator calls.
    #[must_use]
    pub const fn min_call_spacing(&self) -> Duration {
        Duration::from_millis(self.min_call_spacing_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: "/data/plategen".into(),
            pricing: PricingConfig::default(),
            retry_max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            max_concurrent_generations: DEFAULT_MAX_CONCURRENT_GENERATIONS,
            min_call_spacing_ms: DEFAULT_MIN_CALL_SPACING_MS,
            generator_api_url: None,
            generator_api_key: None,
            payment_api_url: None,
            payment_api_key: None,
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or
/// unparseable.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.max_concurrent_generations, 4);
        assert_eq!(config.min_call_spacing(), Duration::from_millis(250));
    }

    #[test]
    fn retry_policy_uses_configured_delays() {
        let config = EngineConfig {
            retry_max_attempts: 5,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 1000,
            ..EngineConfig::default()
        };

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(10), Duration::from_millis(1000));
    }
}
