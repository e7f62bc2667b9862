//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use plategen_core::{
    Account, Job, JobId, JobItem, PaymentEvent, Transaction, TransactionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{AppliedPayment, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,

    /// Per-account settle serialization. `RocksDB` batches are atomic but
    /// not isolated, so every read-check-write on one account runs under
    /// that account's lock. Different accounts do not contend.
    account_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            account_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Get the serialization lock for one account.
    fn account_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self
            .account_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.entry(*user_id).or_default().clone()
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Stage a transaction row and its user index entry into `batch`.
    fn stage_transaction(&self, batch: &mut WriteBatch, transaction: &Transaction) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        let tx_key = keys::transaction_key(&transaction.id);
        let user_tx_key = keys::user_transaction_key(&transaction.user_id, &transaction.id);

        batch.put_cf(&cf_tx, tx_key, Self::serialize(transaction)?);
        batch.put_cf(&cf_by_user, user_tx_key, []); // Index entry (empty value)

        Ok(())
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(&account.user_id);
        let value = Self::serialize(account)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(user_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn get_or_create_account(&self, user_id: &UserId) -> Result<Account> {
        let lock = self.account_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(account) = self.get_account(user_id)? {
            return Ok(account);
        }

        let account = Account::new(*user_id);
        self.put_account(&account)?;
        tracing::debug!(user_id = %user_id, "Created account on first observation");

        Ok(account)
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    fn settle_debit(
        &self,
        user_id: &UserId,
        amount: i64,
        job_id: &JobId,
        description: &str,
    ) -> Result<Transaction> {
        let lock = self.account_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut account = self.get_account(user_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "account",
            id: user_id.to_string(),
        })?;

        // The advisory reserve check is not trusted here: concurrent spends
        // from the same account may have drained the balance since.
        if account.balance < amount {
            return Err(StoreError::InvariantViolation {
                user_id: user_id.to_string(),
                balance: account.balance,
                attempted: amount,
            });
        }

        account.balance -= amount;
        account.lifetime_spent += amount;
        account.updated_at = chrono::Utc::now();

        let transaction = Transaction::consumption(
            *user_id,
            amount,
            account.balance,
            *job_id,
            description.to_string(),
        );

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_accounts,
            keys::account_key(user_id),
            Self::serialize(&account)?,
        );
        self.stage_transaction(&mut batch, &transaction)?;

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(transaction)
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>> {
        let cf = self.cf(cf::TRANSACTIONS)?;
        let key = keys::transaction_key(transaction_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let prefix = keys::user_transactions_prefix(user_id);

        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        // ULIDs are time-ordered, so the prefix scan yields oldest first;
        // collect and reverse for newest-first listing.
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            all_keys.push(key.to_vec());
        }
        all_keys.reverse();

        let mut transactions = Vec::new();
        for key in all_keys.into_iter().skip(offset) {
            if transactions.len() >= limit {
                break;
            }

            let tx_id = keys::extract_transaction_id_from_user_key(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    // =========================================================================
    // Job Operations
    // =========================================================================

    fn put_job(&self, job: &Job) -> Result<()> {
        let cf = self.cf(cf::JOBS)?;
        let key = keys::job_key(&job.id);
        let value = Self::serialize(job)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_job(&self, job_id: &JobId) -> Result<Option<Job>> {
        let cf = self.cf(cf::JOBS)?;
        let key = keys::job_key(job_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_job_item(&self, item: &JobItem) -> Result<()> {
        let cf = self.cf(cf::JOB_ITEMS)?;
        let key = keys::job_item_key(&item.job_id, item.index);
        let value = Self::serialize(item)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_job_item(&self, job_id: &JobId, index: u32) -> Result<Option<JobItem>> {
        let cf = self.cf(cf::JOB_ITEMS)?;
        let key = keys::job_item_key(job_id, index);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_job_items(&self, job_id: &JobId) -> Result<Vec<JobItem>> {
        let cf = self.cf(cf::JOB_ITEMS)?;
        let prefix = keys::job_items_prefix(job_id);

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, rocksdb::Direction::Forward));

        let mut items = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            items.push(Self::deserialize(&value)?);
        }

        Ok(items)
    }

    // =========================================================================
    // Payment Event Operations
    // =========================================================================

    fn register_payment_event(&self, event: &PaymentEvent) -> Result<PaymentEvent> {
        // The account lock doubles as the single-winner guard for this ref:
        // concurrent webhook retries for one payment carry the same user.
        let lock = self.account_lock(&event.user_id);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(existing) = self.get_payment_event(&event.external_ref)? {
            return Ok(existing);
        }

        let cf = self.cf(cf::PAYMENT_EVENTS)?;
        let key = keys::payment_event_key(&event.external_ref);
        let value = Self::serialize(event)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(event.clone())
    }

    fn get_payment_event(&self, external_ref: &str) -> Result<Option<PaymentEvent>> {
        let cf = self.cf(cf::PAYMENT_EVENTS)?;
        let key = keys::payment_event_key(external_ref);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn apply_payment(&self, external_ref: &str) -> Result<AppliedPayment> {
        let mut event =
            self.get_payment_event(external_ref)?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "payment event",
                    id: external_ref.to_string(),
                })?;

        let lock = self.account_lock(&event.user_id);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        // Re-read under the lock: a concurrent delivery may have won.
        event = self
            .get_payment_event(external_ref)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "payment event",
                id: external_ref.to_string(),
            })?;

        if event.is_applied() {
            let balance = self
                .get_account(&event.user_id)?
                .map_or(0, |account| account.balance);
            return Ok(AppliedPayment {
                event,
                transaction: None,
                balance,
            });
        }

        let mut account = match self.get_account(&event.user_id)? {
            Some(account) => account,
            None => Account::new(event.user_id),
        };

        account.balance += event.credits_granted;
        account.lifetime_purchased += event.credits_granted;
        account.updated_at = chrono::Utc::now();

        let transaction = Transaction::purchase(
            event.user_id,
            event.credits_granted,
            account.balance,
            event.external_ref.clone(),
            format!("Purchased {} credits", event.credits_granted),
        );

        event.applied_at = Some(chrono::Utc::now());

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_events = self.cf(cf::PAYMENT_EVENTS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_accounts,
            keys::account_key(&event.user_id),
            Self::serialize(&account)?,
        );
        batch.put_cf(
            &cf_events,
            keys::payment_event_key(&event.external_ref),
            Self::serialize(&event)?,
        );
        self.stage_transaction(&mut batch, &transaction)?;

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(AppliedPayment {
            event,
            transaction: Some(transaction),
            balance: account.balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plategen_core::JobKind;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn funded_account(store: &RocksStore, balance: i64) -> UserId {
        let user_id = UserId::generate();
        let mut account = Account::new(user_id);
        account.balance = balance;
        store.put_account(&account).unwrap();
        user_id
    }

    #[test]
    fn account_created_lazily_once() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        assert!(store.get_account(&user_id).unwrap().is_none());

        let created = store.get_or_create_account(&user_id).unwrap();
        assert_eq!(created.balance, 0);

        // Second call observes the same durable row.
        let again = store.get_or_create_account(&user_id).unwrap();
        assert_eq!(again.created_at, created.created_at);
    }

    #[test]
    fn settle_debit_writes_transaction_and_balance_together() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 10);
        let job_id = JobId::generate();

        let tx = store
            .settle_debit(&user_id, 3, &job_id, "3 menu items")
            .unwrap();

        assert_eq!(tx.amount, -3);
        assert_eq!(tx.balance_after, 7);
        assert_eq!(tx.external_ref, Some(job_id.to_string()));

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.balance, 7);
        assert_eq!(account.lifetime_spent, 3);

        let listed = store.list_transactions_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].amount, -3);
    }

    #[test]
    fn settle_debit_refuses_overdraw() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 2);
        let job_id = JobId::generate();

        let result = store.settle_debit(&user_id, 5, &job_id, "too much");
        assert!(matches!(
            result,
            Err(StoreError::InvariantViolation {
                balance: 2,
                attempted: 5,
                ..
            })
        ));

        // Nothing was written: balance intact, no transaction row.
        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.balance, 2);
        assert!(store
            .list_transactions_by_user(&user_id, 10, 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn concurrent_debits_never_jointly_overdraw() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = funded_account(&store, 2);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.settle_debit(&user_id, 2, &JobId::generate(), "single image")
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.balance, 0);
    }

    #[test]
    fn balance_equals_transaction_sum() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        for (i, credits) in [50i64, 25].into_iter().enumerate() {
            let event = PaymentEvent::new(format!("pay_{i}"), user_id, credits);
            store.register_payment_event(&event).unwrap();
            store.apply_payment(&event.external_ref).unwrap();
        }
        store
            .settle_debit(&user_id, 10, &JobId::generate(), "batch")
            .unwrap();

        let account = store.get_account(&user_id).unwrap().unwrap();
        let sum: i64 = store
            .list_transactions_by_user(&user_id, 100, 0)
            .unwrap()
            .iter()
            .map(|tx| tx.amount)
            .sum();

        assert_eq!(account.balance, 65);
        assert_eq!(account.balance, sum);
    }

    #[test]
    fn transactions_list_newest_first_with_pagination() {
        let (store, _dir) = create_test_store();
        let user_id = funded_account(&store, 100);

        let first = JobId::generate();
        store.settle_debit(&user_id, 1, &first, "first").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2)); // Ensure different ULIDs
        let second = JobId::generate();
        store.settle_debit(&user_id, 2, &second, "second").unwrap();

        let all = store.list_transactions_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].description, "second");
        assert_eq!(all[1].description, "first");

        let page2 = store.list_transactions_by_user(&user_id, 1, 1).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].description, "first");
    }

    #[test]
    fn job_and_items_roundtrip() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        let mut job = Job::new(user_id, JobKind::MenuBatch, 3, 3);
        store.put_job(&job).unwrap();

        // Items resolve out of order; the scan returns them by index.
        store
            .put_job_item(&JobItem::failure(
                job.id,
                2,
                "tiramisu".into(),
                plategen_core::ItemErrorKind::GenerationFailed,
            ))
            .unwrap();
        store
            .put_job_item(&JobItem::success(
                job.id,
                0,
                "carbonara".into(),
                "https://assets/0.png".into(),
            ))
            .unwrap();
        store
            .put_job_item(&JobItem::success(
                job.id,
                1,
                "cacio e pepe".into(),
                "https://assets/1.png".into(),
            ))
            .unwrap();

        let items = store.list_job_items(&job.id).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].index, 0);
        assert_eq!(items[1].index, 1);
        assert_eq!(items[2].index, 2);

        job.finalize(2, 2);
        store.put_job(&job).unwrap();

        let stored = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(stored.completed_units, 2);
        assert_eq!(stored.status, plategen_core::JobStatus::Completed);

        let item = store.get_job_item(&job.id, 2).unwrap().unwrap();
        assert_eq!(item.prompt, "tiramisu");
    }

    #[test]
    fn register_payment_event_single_winner() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        let event = PaymentEvent::new("pay_1".into(), user_id, 50);
        let stored = store.register_payment_event(&event).unwrap();
        assert!(!stored.is_applied());

        // A retry with different credit data does not replace the row.
        let retry = PaymentEvent::new("pay_1".into(), user_id, 9999);
        let stored_again = store.register_payment_event(&retry).unwrap();
        assert_eq!(stored_again.credits_granted, 50);
    }

    #[test]
    fn apply_payment_credits_exactly_once() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();

        let event = PaymentEvent::new("pay_1".into(), user_id, 50);
        store.register_payment_event(&event).unwrap();

        let first = store.apply_payment("pay_1").unwrap();
        assert!(first.newly_applied());
        assert_eq!(first.balance, 50);

        let replay = store.apply_payment("pay_1").unwrap();
        assert!(!replay.newly_applied());
        assert_eq!(replay.balance, 50);

        // Exactly one transaction row carries the reference.
        let transactions = store.list_transactions_by_user(&user_id, 100, 0).unwrap();
        let matching: Vec<_> = transactions
            .iter()
            .filter(|tx| tx.external_ref.as_deref() == Some("pay_1"))
            .collect();
        assert_eq!(matching.len(), 1);

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.balance, 50);
        assert_eq!(account.lifetime_purchased, 50);
    }

    #[test]
    fn apply_payment_unregistered_ref_fails() {
        let (store, _dir) = create_test_store();

        let result = store.apply_payment("pay_unknown");
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn concurrent_apply_payment_credits_once() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let user_id = UserId::generate();

        let event = PaymentEvent::new("pay_1".into(), user_id, 50);
        store.register_payment_event(&event).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.apply_payment("pay_1").unwrap())
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let newly_applied = results.iter().filter(|r| r.newly_applied()).count();
        assert_eq!(newly_applied, 1);

        let account = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(account.balance, 50);
    }
}
