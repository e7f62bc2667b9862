//! Payment reconciliation.
//!
//! Converts external payment confirmations into ledger credits exactly
//! once. Confirmations arrive at-least-once (push notifications with
//! provider retries) or are pulled by reference; both paths funnel through
//! the same idempotency guard.

use std::sync::Arc;

use plategen_core::{PaymentConfirmation, PaymentEvent};
use plategen_store::Store;

use crate::error::{EngineError, Result};
use crate::external::PaymentProvider;

/// Outcome of reconciling one confirmation.
///
/// Replays report `AlreadyApplied` with the originally recorded amounts, so
/// a provider retrying delivery sees the same success either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// This call credited the ledger.
    Applied {
        /// Credits granted.
        credits_granted: i64,
        /// Balance after the credit.
        balance: i64,
    },

    /// The confirmation had already been applied; the ledger was not
    /// touched.
    AlreadyApplied {
        /// Credits granted by the original application.
        credits_granted: i64,
        /// Current balance.
        balance: i64,
    },
}

/// Reconciliation handler.
#[derive(Clone)]
pub struct Reconciliation {
    store: Arc<dyn Store>,
    provider: Option<Arc<dyn PaymentProvider>>,
}

impl Reconciliation {
    /// Create a handler without a pull-based provider.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            provider: None,
        }
    }

    /// Attach a payment provider for pull-based verification.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Record a payment reference at checkout-session creation time, before
    /// any confirmation has arrived. Safe to call repeatedly; the first
    /// registration wins.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the row cannot be written.
    pub fn register(&self, confirmation: &PaymentConfirmation) -> Result<PaymentEvent> {
        let event = PaymentEvent::new(
            confirmation.external_ref.clone(),
            confirmation.user_id,
            confirmation.credits_granted,
        );
        Ok(self.store.register_payment_event(&event)?)
    }

    /// Apply a validated confirmation to the ledger exactly once.
    ///
    /// A confirmation whose reference was never registered is registered on
    /// first sight. If the ledger write fails, the event stays unapplied
    /// and the error is retriable: the provider's delivery retries (or a
    /// later [`Self::verify`]) will complete it.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the ledger write fails; the caller
    /// should have the confirmation redelivered.
    pub fn apply(&self, confirmation: &PaymentConfirmation) -> Result<ReconcileOutcome> {
        // Replay fast path: an applied event never touches the ledger again.
        if let Some(event) = self.store.get_payment_event(&confirmation.external_ref)? {
            if event.is_applied() {
                return self.already_applied(&event);
            }
        } else {
            self.register(confirmation)?;
        }

        let applied = self.store.apply_payment(&confirmation.external_ref)?;

        if let Some(transaction) = &applied.transaction {
            tracing::info!(
                external_ref = %confirmation.external_ref,
                user_id = %applied.event.user_id,
                credits_granted = applied.event.credits_granted,
                balance = applied.balance,
                transaction_id = %transaction.id,
                "Payment applied to ledger"
            );

            Ok(ReconcileOutcome::Applied {
                credits_granted: applied.event.credits_granted,
                balance: applied.balance,
            })
        } else {
            // A concurrent delivery won between our check and the apply.
            tracing::debug!(
                external_ref = %confirmation.external_ref,
                "Replayed payment confirmation ignored"
            );

            Ok(ReconcileOutcome::AlreadyApplied {
                credits_granted: applied.event.credits_granted,
                balance: applied.balance,
            })
        }
    }

    /// Pull-based confirmation: query the provider for `external_ref` and
    /// apply the result through the same exactly-once path.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Provider`] when the provider cannot confirm the
    ///   payment (pending payments are retriable, unknown ones are not).
    /// - [`plategen_core::CreditError::MalformedPaymentEvent`] when the
    ///   provider's response is missing the user or credit amount.
    pub async fn verify(&self, external_ref: &str) -> Result<ReconcileOutcome> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            EngineError::Task("no payment provider configured for verification".into())
        })?;

        let raw = provider.fetch_confirmation(external_ref).await?;
        let confirmation = PaymentConfirmation::parse(
            &raw.external_ref,
            raw.user_id.as_deref(),
            raw.credits_granted,
        )?;

        self.apply(&confirmation)
    }

    fn already_applied(&self, event: &PaymentEvent) -> Result<ReconcileOutcome> {
        let balance = self
            .store
            .get_account(&event.user_id)?
            .map_or(0, |account| account.balance);

        tracing::debug!(
            external_ref = %event.external_ref,
            "Replayed payment confirmation ignored"
        );

        Ok(ReconcileOutcome::AlreadyApplied {
            credits_granted: event.credits_granted,
            balance,
        })
    }
}
