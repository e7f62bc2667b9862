//! Ledger façade over the store.
//!
//! The ledger is the sole source of truth for balances. `reserve` is a fast
//! advisory precondition check; the authoritative balance re-check happens
//! inside the store's atomic settle.

use std::sync::Arc;

use plategen_core::{CreditError, JobId, Transaction, UserId};
use plategen_store::Store;

/// Advisory reservation returned by [`Ledger::reserve`].
///
/// The reservation does not mutate the balance: the true cost is only known
/// after work completes, and the store re-checks the balance at settlement.
/// Dropping a reservation requires no compensating action.
#[derive(Debug, Clone, Copy)]
pub struct Reservation {
    /// The account the reservation was checked against.
    pub user_id: UserId,

    /// The amount that was verified available at check time.
    pub amount: i64,
}

/// Credit ledger operations.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    /// Create a ledger over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Verify the account can cover `amount` credits right now, creating
    /// the account on first observation of the user.
    ///
    /// # Errors
    ///
    /// Returns [`CreditError::InsufficientCredits`] when the balance is too
    /// low, or a storage error.
    pub fn reserve(&self, user_id: &UserId, amount: i64) -> Result<Reservation, CreditError> {
        let account = self.store.get_or_create_account(user_id)?;

        if !account.has_sufficient_credits(amount) {
            return Err(CreditError::InsufficientCredits {
                balance: account.balance,
                required: amount,
            });
        }

        Ok(Reservation {
            user_id: *user_id,
            amount,
        })
    }

    /// Settle the debit for delivered job units.
    ///
    /// # Errors
    ///
    /// Returns [`CreditError::LedgerInvariantViolation`] when the debit
    /// would drive the balance negative (concurrent spends may have drained
    /// it since `reserve`); nothing is written in that case.
    pub fn settle_debit(
        &self,
        user_id: &UserId,
        amount: i64,
        job_id: &JobId,
        description: &str,
    ) -> Result<Transaction, CreditError> {
        let transaction = self
            .store
            .settle_debit(user_id, amount, job_id, description)?;

        tracing::info!(
            user_id = %user_id,
            job_id = %job_id,
            amount = amount,
            balance = transaction.balance_after,
            "Ledger debit settled"
        );

        Ok(transaction)
    }

    /// Current balance for a user; zero for a user never observed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup fails.
    pub fn balance(&self, user_id: &UserId) -> Result<i64, CreditError> {
        Ok(self
            .store
            .get_account(user_id)?
            .map_or(0, |account| account.balance))
    }

    /// List a user's transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup fails.
    pub fn transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>, CreditError> {
        Ok(self.store.list_transactions_by_user(user_id, limit, offset)?)
    }
}
