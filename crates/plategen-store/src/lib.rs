//! `RocksDB` storage layer for plategen.
//!
//! This crate provides persistent storage for accounts, ledger transactions,
//! jobs, job items, and payment events using `RocksDB` with column families.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `accounts`: Primary account records, keyed by `user_id`
//! - `transactions`: Ledger transactions, keyed by `transaction_id` (ULID)
//! - `transactions_by_user`: Index for listing transactions by user
//! - `jobs`: Job records, keyed by `job_id` (ULID)
//! - `job_items`: Per-unit outcomes, keyed by `job_id || index`
//! - `payment_events`: Top-up idempotency records, keyed by `external_ref`
//!
//! # Atomicity
//!
//! Balance mutations go through the compound operations [`Store::settle_debit`]
//! and [`Store::apply_payment`], each of which writes the transaction row, the
//! user index row, and the updated account (plus the payment event, for
//! credits) in a single `WriteBatch`. Settles for one account are serialized
//! by a per-account lock; different accounts proceed independently.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use plategen_core::{
    Account, Job, JobId, JobItem, PaymentEvent, Transaction, TransactionId, UserId,
};

/// Result of applying a payment event to the ledger.
#[derive(Debug, Clone)]
pub struct AppliedPayment {
    /// The payment event after the operation.
    pub event: PaymentEvent,

    /// The purchase transaction, present only when this call performed the
    /// credit. `None` means the event had already been applied and this call
    /// was a no-op replay.
    pub transaction: Option<Transaction>,

    /// The account balance after the operation.
    pub balance: i64,
}

impl AppliedPayment {
    /// Whether this call performed the credit (as opposed to replaying it).
    #[must_use]
    pub const fn newly_applied(&self) -> bool {
        self.transaction.is_some()
    }
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations.
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert or update an account record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_account(&self, account: &Account) -> Result<()>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Get an account, creating an empty one on first observation of the
    /// user. The created account is durable before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_or_create_account(&self, user_id: &UserId) -> Result<Account>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Debit an account for delivered job units: atomically write a
    /// consumption transaction, its user index entry, and the decremented
    /// balance. The balance precondition is re-checked here under the
    /// account lock; callers must not trust an earlier advisory check.
    ///
    /// Returns the settled transaction.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvariantViolation` if the debit would drive the
    ///   balance negative; nothing is written.
    /// - `StoreError::NotFound` if the account does not exist.
    fn settle_debit(
        &self,
        user_id: &UserId,
        amount: i64,
        job_id: &JobId,
        description: &str,
    ) -> Result<Transaction>;

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>>;

    /// List transactions for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;

    // =========================================================================
    // Job Operations
    // =========================================================================

    /// Insert or update a job record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_job(&self, job: &Job) -> Result<()>;

    /// Get a job by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_job(&self, job_id: &JobId) -> Result<Option<Job>>;

    /// Persist one job item outcome. Called the moment the unit resolves so
    /// completed work survives a crash mid-batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_job_item(&self, item: &JobItem) -> Result<()>;

    /// Get one job item.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_job_item(&self, job_id: &JobId, index: u32) -> Result<Option<JobItem>>;

    /// List all recorded items of a job, in index order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_job_items(&self, job_id: &JobId) -> Result<Vec<JobItem>>;

    // =========================================================================
    // Payment Event Operations (top-up idempotency)
    // =========================================================================

    /// Insert a payment event if its `external_ref` is unseen, otherwise
    /// return the stored row unchanged. Single winner under concurrent
    /// delivery retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn register_payment_event(&self, event: &PaymentEvent) -> Result<PaymentEvent>;

    /// Get a payment event by external reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_payment_event(&self, external_ref: &str) -> Result<Option<PaymentEvent>>;

    /// Apply a registered payment event to the ledger exactly once:
    /// atomically write a purchase transaction, its user index entry, the
    /// incremented balance, and the event's `applied_at`. Replays return
    /// the previously recorded outcome without touching the ledger.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if no event with this reference was
    ///   registered.
    fn apply_payment(&self, external_ref: &str) -> Result<AppliedPayment>;
}
