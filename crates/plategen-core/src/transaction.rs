//! Ledger transaction types for plategen.
//!
//! Every balance change creates exactly one immutable transaction record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, TransactionId, UserId};

/// An immutable ledger entry representing one balance change.
///
/// Transactions use ULIDs for time-ordered IDs. The sign convention is
/// positive for credits and negative for debits; `balance_after` records the
/// account balance the moment the transaction settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Amount in credits. Positive = credit, negative = debit.
    pub amount: i64,

    /// Kind of transaction.
    pub kind: TransactionKind,

    /// Balance after this transaction settled.
    pub balance_after: i64,

    /// External reference: payment reference for purchases, job id for
    /// consumption. Used for audit and reconciliation.
    pub external_ref: Option<String>,

    /// Human-readable description.
    pub description: String,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a purchase transaction (credit).
    #[must_use]
    pub fn purchase(
        user_id: UserId,
        amount: i64,
        balance_after: i64,
        external_ref: String,
        description: String,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount,
            kind: TransactionKind::Purchase,
            balance_after,
            external_ref: Some(external_ref),
            description,
            created_at: Utc::now(),
        }
    }

    /// Create a consumption transaction (debit) for a job.
    ///
    /// The amount is stored negated regardless of the sign passed in.
    #[must_use]
    pub fn consumption(
        user_id: UserId,
        amount: i64,
        balance_after: i64,
        job_id: JobId,
        description: String,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount: -amount.abs(),
            kind: TransactionKind::Consumption,
            balance_after,
            external_ref: Some(job_id.to_string()),
            description,
            created_at: Utc::now(),
        }
    }
}

/// Kind of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// User purchased credits.
    Purchase,

    /// Credits consumed by generation work.
    Consumption,
}

impl TransactionKind {
    /// Check if this kind adds credits.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Purchase)
    }

    /// Check if this kind removes credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Consumption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_transaction() {
        let user_id = UserId::generate();
        let tx = Transaction::purchase(user_id, 50, 50, "pay_1".into(), "50 credits".into());

        assert_eq!(tx.amount, 50);
        assert_eq!(tx.kind, TransactionKind::Purchase);
        assert_eq!(tx.balance_after, 50);
        assert_eq!(tx.external_ref.as_deref(), Some("pay_1"));
    }

    #[test]
    fn consumption_transaction_is_negative() {
        let user_id = UserId::generate();
        let job_id = JobId::generate();
        let tx = Transaction::consumption(user_id, 5, 45, job_id, "batch of 5".into());

        assert_eq!(tx.amount, -5);
        assert_eq!(tx.kind, TransactionKind::Consumption);
        assert_eq!(tx.external_ref, Some(job_id.to_string()));
    }

    #[test]
    fn kind_is_credit_debit() {
        assert!(TransactionKind::Purchase.is_credit());
        assert!(!TransactionKind::Purchase.is_debit());
        assert!(TransactionKind::Consumption.is_debit());
        assert!(!TransactionKind::Consumption.is_credit());
    }
}
