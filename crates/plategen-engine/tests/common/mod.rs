//! Common test utilities for plategen-engine integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use plategen_core::{PaymentConfirmation, PaymentEvent, PricingConfig, TransactionId, UserId};
use plategen_engine::external::{
    AssetError, AssetStore, ExtractError, GeneratedImage, GeneratorError, ImageGenerator,
    MenuExtractor, MenuItem, PaymentProvider, ProviderConfirmation, ProviderError,
};
use plategen_engine::{EngineConfig, Orchestrator, Reconciliation};
use plategen_store::{RocksStore, Store};

/// Image generator double scripted per prompt.
#[derive(Default)]
pub struct ScriptedGenerator {
    calls: Mutex<HashMap<String, u32>>,
    fail_substring: Mutex<Option<String>>,
    succeed_after: Mutex<HashMap<String, u32>>,
    delay: Mutex<Duration>,
}

impl ScriptedGenerator {
    /// Every prompt containing `needle` fails permanently.
    pub fn fail_prompts_containing(&self, needle: &str) {
        *self.fail_substring.lock().unwrap() = Some(needle.to_string());
    }

    /// The first `failures` calls for `prompt` are rate-limited, then it
    /// succeeds.
    pub fn succeed_after(&self, prompt: &str, failures: u32) {
        self.succeed_after
            .lock()
            .unwrap()
            .insert(prompt.to_string(), failures);
    }

    /// Every call sleeps this long before resolving.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Number of calls seen for `prompt`.
    pub fn calls_for(&self, prompt: &str) -> u32 {
        self.calls.lock().unwrap().get(prompt).copied().unwrap_or(0)
    }

    /// Total calls across all prompts.
    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ImageGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GeneratorError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(prompt.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        if let Some(needle) = self.fail_substring.lock().unwrap().as_deref() {
            if prompt.contains(needle) {
                return Err(GeneratorError::Api {
                    status: 500,
                    message: "scripted failure".into(),
                });
            }
        }

        if let Some(&failures) = self.succeed_after.lock().unwrap().get(prompt) {
            if call_number <= failures {
                return Err(GeneratorError::RateLimited {
                    retry_after: Some(Duration::from_millis(1)),
                });
            }
        }

        Ok(GeneratedImage {
            data: vec![0x89, 0x50, 0x4e, 0x47],
            content_type: "image/png".into(),
        })
    }
}

/// Asset store double.
#[derive(Default)]
pub struct ScriptedAssets {
    reject_all: AtomicBool,
    stored: Mutex<Vec<String>>,
}

impl ScriptedAssets {
    /// Make every upload fail (sink unreachable).
    pub fn reject_all(&self) {
        self.reject_all.store(true, Ordering::SeqCst);
    }

    /// Names stored so far.
    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for ScriptedAssets {
    async fn store(&self, name: &str, _image: &GeneratedImage) -> Result<String, AssetError> {
        if self.reject_all.load(Ordering::SeqCst) {
            return Err(AssetError::Unreachable("scripted outage".into()));
        }

        self.stored.lock().unwrap().push(name.to_string());
        Ok(format!("https://assets.test/{name}.png"))
    }
}

/// Menu extractor double.
#[derive(Default)]
pub struct ScriptedExtractor {
    items: Mutex<Vec<MenuItem>>,
    fail: AtomicBool,
}

impl ScriptedExtractor {
    /// Script the items the next extraction returns.
    pub fn set_items(&self, items: Vec<MenuItem>) {
        *self.items.lock().unwrap() = items;
    }

    /// Make extraction fail.
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MenuExtractor for ScriptedExtractor {
    async fn extract(&self, _image_ref: &str) -> Result<Vec<MenuItem>, ExtractError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ExtractError::Api {
                status: 503,
                message: "scripted outage".into(),
            });
        }

        Ok(self.items.lock().unwrap().clone())
    }
}

/// Payment provider double for pull-based verification.
#[derive(Default)]
pub struct ScriptedProvider {
    confirmations: Mutex<HashMap<String, ProviderConfirmation>>,
}

impl ScriptedProvider {
    /// Script the confirmation returned for a reference.
    pub fn confirm(&self, external_ref: &str, user_id: Option<String>, credits: Option<i64>) {
        self.confirmations.lock().unwrap().insert(
            external_ref.to_string(),
            ProviderConfirmation {
                external_ref: external_ref.to_string(),
                user_id,
                credits_granted: credits,
            },
        );
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    async fn fetch_confirmation(
        &self,
        external_ref: &str,
    ) -> Result<ProviderConfirmation, ProviderError> {
        self.confirmations
            .lock()
            .unwrap()
            .get(external_ref)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(external_ref.to_string()))
    }
}

/// Test harness containing a fresh store and scripted collaborators.
pub struct TestHarness {
    pub store: Arc<RocksStore>,
    pub orchestrator: Orchestrator,
    pub reconciliation: Reconciliation,
    pub generator: Arc<ScriptedGenerator>,
    pub assets: Arc<ScriptedAssets>,
    pub extractor: Arc<ScriptedExtractor>,
    pub provider: Arc<ScriptedProvider>,
    /// Kept alive for the test duration.
    pub _temp_dir: TempDir,
}

impl TestHarness {
    /// Single-image cost used by the harness pricing.
    pub const SINGLE_COST: i64 = 2;

    /// Per-batch-item cost used by the harness pricing.
    pub const ITEM_COST: i64 = 1;

    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let generator = Arc::new(ScriptedGenerator::default());
        let assets = Arc::new(ScriptedAssets::default());
        let extractor = Arc::new(ScriptedExtractor::default());
        let provider = Arc::new(ScriptedProvider::default());

        let config = EngineConfig {
            pricing: PricingConfig {
                single_image_credits: Self::SINGLE_COST,
                batch_item_credits: Self::ITEM_COST,
            },
            retry_max_attempts: 3,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 5,
            max_concurrent_generations: 4,
            min_call_spacing_ms: 0,
            ..EngineConfig::default()
        };

        let store_dyn: Arc<dyn Store> = store.clone();
        let orchestrator = Orchestrator::new(
            Arc::clone(&store_dyn),
            generator.clone(),
            assets.clone(),
            extractor.clone(),
            &config,
        );
        let reconciliation = Reconciliation::new(store_dyn).with_provider(provider.clone());

        Self {
            store,
            orchestrator,
            reconciliation,
            generator,
            assets,
            extractor,
            provider,
            _temp_dir: temp_dir,
        }
    }

    /// Fund an account through a seed payment so the ledger invariant
    /// (balance == sum of transactions) holds in every test.
    pub fn fund(&self, user_id: UserId, credits: i64) {
        let external_ref = format!("seed_{}", TransactionId::generate());
        let event = PaymentEvent::new(external_ref.clone(), user_id, credits);
        self.store
            .register_payment_event(&event)
            .expect("Failed to register seed payment");
        self.store
            .apply_payment(&external_ref)
            .expect("Failed to apply seed payment");
    }

    /// Current balance for a user.
    pub fn balance(&self, user_id: UserId) -> i64 {
        self.store
            .get_account(&user_id)
            .expect("Failed to read account")
            .map_or(0, |account| account.balance)
    }

    /// Sum of all transaction amounts for a user.
    pub fn transaction_sum(&self, user_id: UserId) -> i64 {
        self.store
            .list_transactions_by_user(&user_id, 1000, 0)
            .expect("Failed to list transactions")
            .iter()
            .map(|tx| tx.amount)
            .sum()
    }

    /// A validated confirmation for tests.
    pub fn confirmation(external_ref: &str, user_id: UserId, credits: i64) -> PaymentConfirmation {
        PaymentConfirmation::parse(external_ref, Some(&user_id.to_string()), Some(credits))
            .expect("valid confirmation")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Build `count` menu items named `dish-0..count`, marking the indices in
/// `failing` with a name the scripted generator is told to fail.
pub fn menu_items(count: usize, failing: &[usize]) -> Vec<MenuItem> {
    (0..count)
        .map(|i| MenuItem {
            name: if failing.contains(&i) {
                format!("dish-{i} UNRENDERABLE")
            } else {
                format!("dish-{i}")
            },
            price: Some(format!("{}.50", 8 + i)),
            description: None,
        })
        .collect()
}
