//! Identifier types shared by every crate of the cashback ledger.

pub mod order_number;
pub mod types;

pub use order_number::{OrderNumber, OrderNumberError};
pub use types::UserId;
