//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Ledger transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Job records, keyed by `job_id` (ULID).
    pub const JOBS: &str = "jobs";

    /// Job item records, keyed by `job_id || index` (big-endian u32 so
    /// prefix scans return items in index order).
    pub const JOB_ITEMS: &str = "job_items";

    /// Payment events for top-up idempotency, keyed by `external_ref`.
    pub const PAYMENT_EVENTS: &str = "payment_events";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::JOBS,
        cf::JOB_ITEMS,
        cf::PAYMENT_EVENTS,
    ]
}
