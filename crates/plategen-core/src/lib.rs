//! Core types and utilities for plategen.
//!
//! This crate provides the foundational types used throughout the plategen
//! platform:
//!
//! - **Identifiers**: `UserId`, `JobId`, `TransactionId`
//! - **Accounts**: `Account`
//! - **Ledger**: `Transaction`, `TransactionKind`
//! - **Jobs**: `Job`, `JobItem`, `JobStatus`, `ItemOutcome`
//! - **Payments**: `PaymentEvent`, `PaymentConfirmation`
//! - **Pricing**: `PricingConfig`
//!
//! # Credit Unit
//!
//! A credit is the indivisible unit of purchased generation capacity.
//! Balances and amounts are stored as `i64` whole credits to avoid floating
//! point precision issues; an account balance is always the sum of its
//! ledger transactions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod error;
pub mod ids;
pub mod job;
pub mod payment;
pub mod pricing;
pub mod transaction;

pub use account::Account;
pub use error::{CreditError, Result};
pub use ids::{IdError, JobId, TransactionId, UserId};
pub use job::{Amends, ItemErrorKind, ItemOutcome, Job, JobItem, JobKind, JobStatus};
pub use payment::{PaymentConfirmation, PaymentEvent};
pub use pricing::{PricingConfig, DEFAULT_BATCH_ITEM_CREDITS, DEFAULT_SINGLE_IMAGE_CREDITS};
pub use transaction::{Transaction, TransactionKind};
