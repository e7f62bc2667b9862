//! Payment reconciliation types for plategen.
//!
//! A `PaymentEvent` row exists per external payment reference and is the
//! idempotency guard that makes top-ups exactly-once: the row is created at
//! checkout-session creation time (or on first sight of a confirmation) and
//! its `applied_at` timestamp is set in the same atomic write as the ledger
//! credit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CreditError;
use crate::UserId;

/// Reconciliation record keyed by the external payment reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Globally unique payment reference from the payment provider.
    pub external_ref: String,

    /// The user to credit.
    pub user_id: UserId,

    /// Credits to grant when the payment is applied.
    pub credits_granted: i64,

    /// When the row was first seen.
    pub created_at: DateTime<Utc>,

    /// Set exactly once, in the same atomic write as the ledger credit.
    /// A non-null value means replayed confirmations are pure no-ops.
    pub applied_at: Option<DateTime<Utc>>,
}

impl PaymentEvent {
    /// Create an unapplied payment event.
    #[must_use]
    pub fn new(external_ref: String, user_id: UserId, credits_granted: i64) -> Self {
        Self {
            external_ref,
            user_id,
            credits_granted,
            created_at: Utc::now(),
            applied_at: None,
        }
    }

    /// Check whether this event has already been applied to the ledger.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// A validated payment confirmation triple.
///
/// Built from the raw fields a payment provider delivers (webhook payload or
/// pull-based verification response); construction is where malformed events
/// are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    /// Globally unique payment reference.
    pub external_ref: String,

    /// The user to credit.
    pub user_id: UserId,

    /// Credits purchased.
    pub credits_granted: i64,
}

impl PaymentConfirmation {
    /// Validate a raw confirmation triple.
    ///
    /// # Errors
    ///
    /// Returns [`CreditError::MalformedPaymentEvent`] when the reference is
    /// empty, the user id is missing or unparseable, or the credit amount is
    /// missing or not positive. These are permanent errors surfaced for
    /// manual reconciliation, never retried.
    pub fn parse(
        external_ref: &str,
        user_id: Option<&str>,
        credits_granted: Option<i64>,
    ) -> Result<Self, CreditError> {
        if external_ref.is_empty() {
            return Err(CreditError::MalformedPaymentEvent {
                reason: "empty external_ref".into(),
            });
        }

        let user_id = user_id
            .ok_or_else(|| CreditError::MalformedPaymentEvent {
                reason: format!("{external_ref}: missing user id"),
            })?
            .parse::<UserId>()
            .map_err(|_| CreditError::MalformedPaymentEvent {
                reason: format!("{external_ref}: invalid user id"),
            })?;

        let credits_granted = credits_granted.ok_or_else(|| CreditError::MalformedPaymentEvent {
            reason: format!("{external_ref}: missing credits_granted"),
        })?;

        if credits_granted <= 0 {
            return Err(CreditError::MalformedPaymentEvent {
                reason: format!("{external_ref}: non-positive credits_granted {credits_granted}"),
            });
        }

        Ok(Self {
            external_ref: external_ref.to_string(),
            user_id,
            credits_granted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_is_unapplied() {
        let event = PaymentEvent::new("pay_1".into(), UserId::generate(), 50);
        assert!(!event.is_applied());
    }

    #[test]
    fn parse_valid_confirmation() {
        let user = UserId::generate();
        let conf =
            PaymentConfirmation::parse("pay_1", Some(&user.to_string()), Some(50)).unwrap();
        assert_eq!(conf.external_ref, "pay_1");
        assert_eq!(conf.user_id, user);
        assert_eq!(conf.credits_granted, 50);
    }

    #[test]
    fn parse_rejects_missing_user() {
        let err = PaymentConfirmation::parse("pay_1", None, Some(50)).unwrap_err();
        assert!(matches!(err, CreditError::MalformedPaymentEvent { .. }));
    }

    #[test]
    fn parse_rejects_bad_user() {
        let err = PaymentConfirmation::parse("pay_1", Some("nope"), Some(50)).unwrap_err();
        assert!(matches!(err, CreditError::MalformedPaymentEvent { .. }));
    }

    #[test]
    fn parse_rejects_non_positive_credits() {
        let user = UserId::generate().to_string();
        for credits in [None, Some(0), Some(-5)] {
            let err = PaymentConfirmation::parse("pay_1", Some(&user), credits).unwrap_err();
            assert!(matches!(err, CreditError::MalformedPaymentEvent { .. }));
        }
    }
}
