//! Metered job orchestration and payment reconciliation for plategen.
//!
//! This crate safely meters a scarce paid resource under concurrency and
//! partial failure. It provides:
//!
//! - **Retrying Caller** ([`retry`]): backoff with provider retry-after
//!   hints for the rate-limited generator.
//! - **Ledger** ([`ledger`]): advisory reservation plus authoritative,
//!   atomic settlement against the store.
//! - **Job Orchestrator** ([`orchestrator`]): single-image and menu-batch
//!   jobs, a global bounded worker pool, per-unit durable outcomes, and
//!   debit-for-delivered-work settlement.
//! - **Reconciliation** ([`reconcile`]): exactly-once conversion of payment
//!   confirmations into ledger credits.
//! - **External collaborators** ([`external`]): traits and HTTP clients for
//!   the vision extractor, image generator, asset store, and payment
//!   provider.
//!
//! The HTTP surface, rendering, and authentication live outside this crate;
//! every entry point takes an already-authenticated [`plategen_core::UserId`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod external;
pub mod ledger;
pub mod orchestrator;
pub mod reconcile;
pub mod retry;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use external::{
    AssetStore, GeneratedImage, HttpImageGenerator, HttpPaymentProvider, ImageGenerator,
    MenuExtractor, MenuItem, PaymentProvider,
};
pub use ledger::{Ledger, Reservation};
pub use orchestrator::Orchestrator;
pub use reconcile::{ReconcileOutcome, Reconciliation};
pub use retry::{call_with_retry, RetryPolicy};
