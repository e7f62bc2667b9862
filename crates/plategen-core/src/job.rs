//! Job and job item types for plategen.
//!
//! A job is one user-initiated request to spend credits on one or more
//! generation units. Jobs are created `pending` and finish in exactly one of
//! two terminal states; once terminal they are a historical record and are
//! never re-entered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, UserId};

/// Kind of metered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// One prompt, one generated image.
    SingleImage,

    /// One image per dish extracted from a menu photo.
    MenuBatch,
}

/// Status of a job.
///
/// `Pending` transitions to exactly one of `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Work is in flight.
    Pending,

    /// At least one unit succeeded and the ledger debit settled.
    Completed,

    /// No unit succeeded, or settlement was aborted. Nothing was charged
    /// beyond the units actually delivered.
    Failed,
}

impl JobStatus {
    /// Check if this status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Reference to the job item a regeneration job amends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amends {
    /// The parent job.
    pub job_id: JobId,

    /// The item index within the parent job.
    pub item_index: u32,
}

/// One metering-relevant unit of work requested by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID (ULID for time-ordering).
    pub id: JobId,

    /// The user who requested the work.
    pub user_id: UserId,

    /// Kind of job.
    pub kind: JobKind,

    /// Units of work requested (1 for single image, N for a batch).
    pub requested_units: u32,

    /// Units that produced a durable asset.
    pub completed_units: u32,

    /// Units that terminally failed.
    pub failed_units: u32,

    /// Current status.
    pub status: JobStatus,

    /// Credits checked at admission time. Advisory only.
    pub credits_reserved: i64,

    /// Credits actually debited at settlement. Always `<= credits_reserved`.
    pub credits_charged: i64,

    /// Set when this job re-runs one item of an earlier job.
    pub amends: Option<Amends>,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// When the job reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    #[must_use]
    pub fn new(user_id: UserId, kind: JobKind, requested_units: u32, credits_reserved: i64) -> Self {
        Self {
            id: JobId::generate(),
            user_id,
            kind,
            requested_units,
            completed_units: 0,
            failed_units: 0,
            status: JobStatus::Pending,
            credits_reserved,
            credits_charged: 0,
            amends: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Mark this job as a regeneration of one item of an earlier job.
    #[must_use]
    pub fn amending(mut self, job_id: JobId, item_index: u32) -> Self {
        self.amends = Some(Amends { job_id, item_index });
        self
    }

    /// Finalize the job from its recorded item outcomes.
    ///
    /// `completed` of `requested_units` items succeeded and `charged` credits
    /// were settled for them. Status is `Completed` iff at least one unit
    /// succeeded.
    pub fn finalize(&mut self, completed: u32, charged: i64) {
        self.completed_units = completed;
        self.failed_units = self.requested_units - completed;
        self.credits_charged = charged;
        self.status = if completed > 0 {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        self.finished_at = Some(Utc::now());
    }

    /// Finalize the job as failed with nothing charged, preserving the
    /// recorded unit counts. Used when settlement is aborted: the delivered
    /// items stay on record but no debit was written for them.
    pub fn fail_uncharged(&mut self, completed: u32) {
        self.completed_units = completed;
        self.failed_units = self.requested_units - completed;
        self.credits_charged = 0;
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
    }
}

/// Outcome of one job item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    /// A durable asset was produced.
    Success,

    /// The unit terminally failed; it is not charged.
    Failure,
}

/// Why a job item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorKind {
    /// The generator exhausted its retries.
    GenerationFailed,

    /// The generator produced an image but the asset sink rejected it.
    /// Distinct from `GenerationFailed` so the user retries instead of the
    /// failure being treated as success.
    PersistenceFailed,
}

/// One individually priced, individually retried unit within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobItem {
    /// The owning job.
    pub job_id: JobId,

    /// Index within the job, `0..requested_units`.
    pub index: u32,

    /// The description sent to the generator. Kept so a single item can be
    /// regenerated later without re-running extraction.
    pub prompt: String,

    /// Outcome of the unit.
    pub outcome: ItemOutcome,

    /// Durable URL of the produced asset, for successful units.
    pub result_ref: Option<String>,

    /// Failure classification, for failed units.
    pub error_kind: Option<ItemErrorKind>,

    /// When the unit resolved.
    pub finished_at: DateTime<Utc>,
}

impl JobItem {
    /// Record a successful unit.
    #[must_use]
    pub fn success(job_id: JobId, index: u32, prompt: String, result_ref: String) -> Self {
        Self {
            job_id,
            index,
            prompt,
            outcome: ItemOutcome::Success,
            result_ref: Some(result_ref),
            error_kind: None,
            finished_at: Utc::now(),
        }
    }

    /// Record a failed unit.
    #[must_use]
    pub fn failure(job_id: JobId, index: u32, prompt: String, error_kind: ItemErrorKind) -> Self {
        Self {
            job_id,
            index,
            prompt,
            outcome: ItemOutcome::Failure,
            result_ref: None,
            error_kind: Some(error_kind),
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_pending() {
        let job = Job::new(UserId::generate(), JobKind::MenuBatch, 10, 10);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.status.is_terminal());
        assert_eq!(job.credits_charged, 0);
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn finalize_partial_success_completes() {
        let mut job = Job::new(UserId::generate(), JobKind::MenuBatch, 10, 10);
        job.finalize(7, 7);

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed_units, 7);
        assert_eq!(job.failed_units, 3);
        assert_eq!(job.credits_charged, 7);
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn finalize_zero_successes_fails() {
        let mut job = Job::new(UserId::generate(), JobKind::MenuBatch, 4, 4);
        job.finalize(0, 0);

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.credits_charged, 0);
    }

    #[test]
    fn fail_uncharged_keeps_counts() {
        let mut job = Job::new(UserId::generate(), JobKind::MenuBatch, 10, 10);
        job.fail_uncharged(7);

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.credits_charged, 0);
        assert_eq!(job.completed_units, 7);
        assert_eq!(job.failed_units, 3);
    }

    #[test]
    fn amending_records_parent() {
        let parent = JobId::generate();
        let job = Job::new(UserId::generate(), JobKind::SingleImage, 1, 2).amending(parent, 3);

        let amends = job.amends.unwrap();
        assert_eq!(amends.job_id, parent);
        assert_eq!(amends.item_index, 3);
    }

    #[test]
    fn item_constructors() {
        let job_id = JobId::generate();
        let ok = JobItem::success(job_id, 0, "seared scallops".into(), "https://a/0.png".into());
        assert_eq!(ok.outcome, ItemOutcome::Success);
        assert!(ok.error_kind.is_none());

        let bad = JobItem::failure(job_id, 1, "onion soup".into(), ItemErrorKind::PersistenceFailed);
        assert_eq!(bad.outcome, ItemOutcome::Failure);
        assert_eq!(bad.error_kind, Some(ItemErrorKind::PersistenceFailed));
        assert!(bad.result_ref.is_none());
    }
}
