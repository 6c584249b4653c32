//! Order submission, listing and cashback withdrawals on top of the order store.
//!
//! Submitted numbers pass the Luhn admission check, are recorded as `NEW` and
//! handed to the accrual worker pool, which owns every later status change.
//! Accruals of `PROCESSED` orders make up the balance users withdraw from.

pub mod error;
pub mod service;

pub use error::{OrderServiceError, Result};
pub use service::{OrderService, SubmitOutcome};
