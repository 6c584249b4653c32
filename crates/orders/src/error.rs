//! Order service error types.

use common::{OrderNumber, OrderNumberError};
use order_store::StoreError;
use thiserror::Error;

/// Errors that can occur when submitting or listing orders and withdrawals.
#[derive(Debug, Error)]
pub enum OrderServiceError {
    /// The submitted text is not a positive integer.
    #[error("Malformed order number: {0}")]
    BadNumberFormat(OrderNumberError),

    /// The number fails the Luhn admission check.
    #[error("Invalid order number: {0}")]
    InvalidNumber(OrderNumberError),

    /// The number was already submitted by a different user.
    #[error("Order {0} was already submitted by another user")]
    OwnedByAnotherUser(OrderNumber),

    /// A withdrawal names a malformed or Luhn-invalid order number.
    #[error("Invalid withdrawal order number: {0}")]
    InvalidWithdrawalNumber(OrderNumberError),

    /// A withdrawal against this order number was already made.
    #[error("Withdrawal against order {0} already exists")]
    WithdrawalExists(OrderNumber),

    /// Withdrawal sums must be positive.
    #[error("Invalid withdrawal sum: {0}")]
    InvalidSum(f64),

    /// The balance does not cover the withdrawal.
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: f64, available: f64 },

    /// An error occurred in the order store.
    #[error("Order store error: {0}")]
    Store(#[from] StoreError),
}

impl From<OrderNumberError> for OrderServiceError {
    fn from(e: OrderNumberError) -> Self {
        match e {
            OrderNumberError::ChecksumMismatch(_) => OrderServiceError::InvalidNumber(e),
            OrderNumberError::NotNumeric | OrderNumberError::OutOfRange(_) => {
                OrderServiceError::BadNumberFormat(e)
            }
        }
    }
}

/// Result type for order service operations.
pub type Result<T> = std::result::Result<T, OrderServiceError>;
