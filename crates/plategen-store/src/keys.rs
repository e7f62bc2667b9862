//! Key construction for `RocksDB` column families.
//!
//! Keys are raw identifier bytes so that ULID-keyed families iterate in
//! chronological order.

use plategen_core::{JobId, TransactionId, UserId};

/// Key for an account record: the user's UUID bytes.
#[must_use]
pub fn account_key(user_id: &UserId) -> [u8; 16] {
    *user_id.as_bytes()
}

/// Key for a transaction record: the ULID bytes.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> [u8; 16] {
    transaction_id.to_bytes()
}

/// Key for the per-user transaction index: `user_id || transaction_id`.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(user_id.as_bytes());
    key[16..].copy_from_slice(&transaction_id.to_bytes());
    key
}

/// Prefix covering all of a user's transaction index entries.
#[must_use]
pub fn user_transactions_prefix(user_id: &UserId) -> [u8; 16] {
    *user_id.as_bytes()
}

/// Recover the transaction id from a `user_id || transaction_id` index key.
///
/// # Panics
///
/// Panics if the key is shorter than 32 bytes; index keys are always written
/// through [`user_transaction_key`].
#[must_use]
pub fn extract_transaction_id_from_user_key(key: &[u8]) -> TransactionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    TransactionId::from_bytes(bytes).expect("ULID bytes are infallible")
}

/// Key for a job record: the ULID bytes.
#[must_use]
pub fn job_key(job_id: &JobId) -> [u8; 16] {
    job_id.to_bytes()
}

/// Key for a job item: `job_id || index` (big-endian so prefix scans return
/// items in index order).
#[must_use]
pub fn job_item_key(job_id: &JobId, index: u32) -> [u8; 20] {
    let mut key = [0u8; 20];
    key[..16].copy_from_slice(&job_id.to_bytes());
    key[16..].copy_from_slice(&index.to_be_bytes());
    key
}

/// Prefix covering all items of a job.
#[must_use]
pub fn job_items_prefix(job_id: &JobId) -> [u8; 16] {
    job_id.to_bytes()
}

/// Key for a payment event: the external reference bytes.
#[must_use]
pub fn payment_event_key(external_ref: &str) -> &[u8] {
    external_ref.as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_transaction_key_roundtrip() {
        let user = UserId::generate();
        let tx = TransactionId::generate();

        let key = user_transaction_key(&user, &tx);
        assert!(key.starts_with(&user_transactions_prefix(&user)));
        assert_eq!(extract_transaction_id_from_user_key(&key), tx);
    }

    #[test]
    fn job_item_keys_sort_by_index() {
        let job = JobId::generate();
        let a = job_item_key(&job, 1);
        let b = job_item_key(&job, 2);
        let c = job_item_key(&job, 300);

        assert!(a < b);
        assert!(b < c);
        assert!(a.starts_with(&job_items_prefix(&job)));
    }
}
