//! Account types for plategen.
//!
//! An account tracks a user's credit balance. Accounts are created lazily on
//! first observation of a user and are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A credit account for a user.
///
/// The `balance` field is a materialized cache of the sum of the account's
/// ledger transactions; the store updates both in the same atomic write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The user this account belongs to.
    pub user_id: UserId,

    /// Current credit balance. Never negative.
    pub balance: i64,

    /// Lifetime credits purchased.
    pub lifetime_purchased: i64,

    /// Lifetime credits spent on generation work.
    pub lifetime_spent: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: 0,
            lifetime_purchased: 0,
            lifetime_spent: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account can cover a debit of `amount` credits.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}
