//! The metered job orchestrator.
//!
//! One state machine drives both job shapes: reserve credits (advisory),
//! create the job `pending`, run each unit through the retrying caller,
//! persist every unit outcome the moment it resolves, then settle the
//! ledger debit for exactly the units that succeeded.
//!
//! Units across all concurrent jobs share one worker pool and one pacer,
//! because the external generator's rate limit is a single system-wide
//! budget, not a per-user or per-job one.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use plategen_core::{
    CreditError, ItemErrorKind, ItemOutcome, Job, JobId, JobItem, JobKind, PricingConfig, UserId,
};
use plategen_store::Store;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::external::{AssetStore, GeneratorError, ImageGenerator, MenuExtractor, MenuItem};
use crate::ledger::Ledger;
use crate::retry::{call_with_retry, RetryPolicy};

/// Enforces the minimum spacing between calls to the shared generator.
///
/// Each caller claims the next free slot under the lock and sleeps outside
/// it, so a long wait never blocks other claimants from queueing behind.
struct Pacer {
    spacing: Duration,
    next_slot: Mutex<Instant>,
}

impl Pacer {
    fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    async fn pace(&self) {
        if self.spacing.is_zero() {
            return;
        }

        let wait = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = (*next).max(now);
            *next = slot + self.spacing;
            slot - now
        };

        if wait > Duration::ZERO {
            tokio::time::sleep(wait).await;
        }
    }
}

struct Inner {
    store: Arc<dyn Store>,
    ledger: Ledger,
    generator: Arc<dyn ImageGenerator>,
    assets: Arc<dyn AssetStore>,
    extractor: Arc<dyn MenuExtractor>,
    pricing: PricingConfig,
    retry: RetryPolicy,
    pool: Semaphore,
    pacer: Pacer,
}

/// Orchestrates metered generation jobs.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Create an orchestrator over a store and the external collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn ImageGenerator>,
        assets: Arc<dyn AssetStore>,
        extractor: Arc<dyn MenuExtractor>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger: Ledger::new(Arc::clone(&store)),
                store,
                generator,
                assets,
                extractor,
                pricing: config.pricing.clone(),
                retry: config.retry_policy(),
                pool: Semaphore::new(config.max_concurrent_generations),
                pacer: Pacer::new(config.min_call_spacing()),
            }),
        }
    }

    /// Generate one image for one prompt.
    ///
    /// # Errors
    ///
    /// - [`CreditError::InsufficientCredits`] before any job is created,
    ///   or when a concurrent spend drains the balance before settlement;
    ///   in the latter case the job is recorded `failed` with no charge.
    pub async fn submit_single(&self, user_id: UserId, prompt: impl Into<String>) -> Result<Job> {
        let prompt = prompt.into();
        let cost = self.inner.pricing.single_image_credits;
        self.inner.ledger.reserve(&user_id, cost)?;

        let job = Job::new(user_id, JobKind::SingleImage, 1, cost);
        self.inner.store.put_job(&job)?;

        tracing::info!(
            job_id = %job.id,
            user_id = %user_id,
            credits_reserved = cost,
            "Single image job admitted"
        );

        self.run_detached(job, vec![prompt], cost).await
    }

    /// Generate one image per extracted menu item.
    ///
    /// Items are processed with bounded concurrency; each outcome is
    /// durable the moment it resolves, and the ledger is debited only for
    /// the units that succeeded. Partial success completes the job.
    ///
    /// # Errors
    ///
    /// - [`CreditError::NoWorkExtracted`] for an empty item list; nothing
    ///   is reserved or created.
    /// - [`CreditError::InsufficientCredits`] if the balance cannot cover
    ///   the full batch; enforced here at entry, never discovered mid-batch.
    pub async fn submit_batch(&self, user_id: UserId, items: Vec<MenuItem>) -> Result<Job> {
        if items.is_empty() {
            return Err(CreditError::NoWorkExtracted.into());
        }

        let units = u32::try_from(items.len())
            .map_err(|_| EngineError::Task(format!("batch of {} items", items.len())))?;
        let per_unit_cost = self.inner.pricing.batch_item_credits;
        let reserve_amount = self.inner.pricing.batch_reservation(units);
        self.inner.ledger.reserve(&user_id, reserve_amount)?;

        let job = Job::new(user_id, JobKind::MenuBatch, units, reserve_amount);
        self.inner.store.put_job(&job)?;

        tracing::info!(
            job_id = %job.id,
            user_id = %user_id,
            requested_units = units,
            credits_reserved = reserve_amount,
            "Menu batch job admitted"
        );

        let prompts = items.iter().map(dish_prompt).collect();
        self.run_detached(job, prompts, per_unit_cost).await
    }

    /// Extract dishes from a menu photo and submit them as a batch.
    ///
    /// Extraction runs before any job exists and is not metered; its
    /// failures surface directly and cost nothing.
    ///
    /// # Errors
    ///
    /// [`EngineError::Extraction`] when the vision service fails, plus
    /// everything [`Self::submit_batch`] can return.
    pub async fn submit_menu(&self, user_id: UserId, image_ref: &str) -> Result<Job> {
        let items = self.inner.extractor.extract(image_ref).await?;

        tracing::info!(
            user_id = %user_id,
            image_ref = %image_ref,
            items = items.len(),
            "Menu extracted"
        );

        self.submit_batch(user_id, items).await
    }

    /// Re-run one item of an earlier job as an independent metering event.
    ///
    /// Priced and settled exactly like [`Self::submit_single`]; the new job
    /// records which job and index it amends. The parent job's terminal
    /// status is not reopened.
    ///
    /// # Errors
    ///
    /// [`CreditError::JobNotFound`] / [`CreditError::JobItemNotFound`] when
    /// the parent is missing or owned by another user, plus everything
    /// [`Self::submit_single`] can return.
    pub async fn regenerate_item(
        &self,
        user_id: UserId,
        job_id: JobId,
        item_index: u32,
    ) -> Result<Job> {
        let parent = self
            .inner
            .store
            .get_job(&job_id)?
            .ok_or_else(|| CreditError::JobNotFound {
                job_id: job_id.to_string(),
            })?;

        if parent.user_id != user_id {
            // Do not reveal other users' jobs.
            return Err(CreditError::JobNotFound {
                job_id: job_id.to_string(),
            }
            .into());
        }

        let item = self
            .inner
            .store
            .get_job_item(&job_id, item_index)?
            .ok_or_else(|| CreditError::JobItemNotFound {
                job_id: job_id.to_string(),
                index: item_index,
            })?;

        let cost = self.inner.pricing.single_image_credits;
        self.inner.ledger.reserve(&user_id, cost)?;

        let job = Job::new(user_id, JobKind::SingleImage, 1, cost).amending(job_id, item_index);
        self.inner.store.put_job(&job)?;

        tracing::info!(
            job_id = %job.id,
            amends_job = %job_id,
            amends_index = item_index,
            user_id = %user_id,
            "Regeneration job admitted"
        );

        self.run_detached(job, vec![item.prompt], cost).await
    }

    /// Get a job by ID.
    ///
    /// # Errors
    ///
    /// [`CreditError::JobNotFound`] when no such job exists.
    pub fn job(&self, job_id: &JobId) -> Result<Job> {
        Ok(self
            .inner
            .store
            .get_job(job_id)?
            .ok_or_else(|| CreditError::JobNotFound {
                job_id: job_id.to_string(),
            })?)
    }

    /// List the recorded item outcomes of a job, in index order.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup fails.
    pub fn job_items(&self, job_id: &JobId) -> Result<Vec<JobItem>> {
        Ok(self.inner.store.list_job_items(job_id)?)
    }

    /// Run the job body on its own task. Work that reaches `pending` has
    /// consumed provider rate budget, so client abandonment (the caller
    /// dropping this future) must not cancel it; the spawned task runs to
    /// completion and settles regardless.
    async fn run_detached(&self, job: Job, prompts: Vec<String>, per_unit_cost: i64) -> Result<Job> {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(Inner::drive(inner, job, prompts, per_unit_cost));

        handle
            .await
            .map_err(|e| EngineError::Task(e.to_string()))?
    }
}

impl Inner {
    /// Fan the units out, fan the outcomes in, settle, finalize.
    async fn drive(
        self: Arc<Self>,
        mut job: Job,
        prompts: Vec<String>,
        per_unit_cost: i64,
    ) -> Result<Job> {
        let mut handles = Vec::with_capacity(prompts.len());
        for (index, prompt) in prompts.into_iter().enumerate() {
            let inner = Arc::clone(&self);
            let job_id = job.id;
            #[allow(clippy::cast_possible_truncation)]
            let index = index as u32;
            handles.push(tokio::spawn(async move {
                inner.run_unit(job_id, index, prompt).await
            }));
        }

        // Outcomes land out of order; the counts are order-independent.
        let mut completed = 0u32;
        for outcome in join_all(handles).await {
            match outcome {
                Ok(true) => completed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Job unit task died");
                }
            }
        }

        let charged = per_unit_cost * i64::from(completed);

        if completed > 0 {
            let description = match job.kind {
                JobKind::SingleImage => "Generated 1 image".to_string(),
                JobKind::MenuBatch => format!(
                    "Generated {completed} of {} menu images",
                    job.requested_units
                ),
            };

            if let Err(err) = self
                .ledger
                .settle_debit(&job.user_id, charged, &job.id, &description)
            {
                // The settlement aborts alone: recorded items stay intact
                // and nothing is charged.
                tracing::error!(
                    job_id = %job.id,
                    user_id = %job.user_id,
                    charged,
                    error = %err,
                    "Settlement refused; failing job with no charge"
                );
                job.fail_uncharged(completed);
                self.store.put_job(&job)?;

                // A settle-time shortfall means a concurrent spend drained
                // the balance after the advisory reserve; the caller sees
                // that as insufficient credits, not an internal fault.
                let err = match err {
                    CreditError::LedgerInvariantViolation {
                        balance, attempted, ..
                    } => CreditError::InsufficientCredits {
                        balance,
                        required: attempted,
                    },
                    other => other,
                };
                return Err(err.into());
            }

            job.finalize(completed, charged);
        } else {
            job.finalize(0, 0);
        }

        self.store.put_job(&job)?;

        tracing::info!(
            job_id = %job.id,
            user_id = %job.user_id,
            status = ?job.status,
            completed_units = job.completed_units,
            failed_units = job.failed_units,
            credits_charged = job.credits_charged,
            "Job finished"
        );

        Ok(job)
    }

    /// Run one unit and persist its outcome immediately. Returns whether
    /// the unit is billable.
    async fn run_unit(&self, job_id: JobId, index: u32, prompt: String) -> bool {
        let item = match self.generate_and_persist(job_id, index, &prompt).await {
            Ok(url) => JobItem::success(job_id, index, prompt, url),
            Err(kind) => JobItem::failure(job_id, index, prompt, kind),
        };

        let billable = item.outcome == ItemOutcome::Success;

        if let Err(err) = self.store.put_job_item(&item) {
            // An unrecorded unit cannot be billed or reported.
            tracing::error!(
                job_id = %job_id,
                index,
                error = %err,
                "Failed to record job item outcome"
            );
            return false;
        }

        billable
    }

    /// One generation unit: pool slot, paced + retried generator call,
    /// then durable persistence of the result.
    async fn generate_and_persist(
        &self,
        job_id: JobId,
        index: u32,
        prompt: &str,
    ) -> std::result::Result<String, ItemErrorKind> {
        let Ok(permit) = self.pool.acquire().await else {
            tracing::error!(job_id = %job_id, index, "Generation pool closed");
            return Err(ItemErrorKind::GenerationFailed);
        };

        let pacer = &self.pacer;
        let generator = self.generator.as_ref();
        let image = call_with_retry(&self.retry, GeneratorError::retry_after, move || async move {
            pacer.pace().await;
            generator.generate(prompt).await
        })
        .await
        .map_err(|err| {
            tracing::warn!(
                job_id = %job_id,
                index,
                error = %err,
                "Generation failed after retries"
            );
            ItemErrorKind::GenerationFailed
        })?;

        // The asset sink is not covered by the generator's rate budget.
        drop(permit);

        let name = format!("{job_id}-{index}");
        self.assets.store(&name, &image).await.map_err(|err| {
            tracing::warn!(
                job_id = %job_id,
                index,
                error = %err,
                "Generated image could not be persisted"
            );
            ItemErrorKind::PersistenceFailed
        })
    }
}

/// Build the generation prompt for a dish.
fn dish_prompt(item: &MenuItem) -> String {
    match item.description.as_deref() {
        Some(description) if !description.is_empty() => {
            format!("{}, {}", item.name, description)
        }
        _ => item.name.clone(),
    }
}
