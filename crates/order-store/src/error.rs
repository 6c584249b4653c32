use thiserror::Error;

use crate::{OrderNumber, OrderStatus, UserId};

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No order row matched; for updates this means zero rows were affected.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderNumber),

    /// The order number is already registered.
    #[error("Order {number} was already submitted by user {owner}")]
    DuplicateOrder { number: OrderNumber, owner: UserId },

    /// The stored order is terminal and must not be written again.
    #[error("Order {number} is already in terminal status {status}")]
    TerminalStatus {
        number: OrderNumber,
        status: OrderStatus,
    },

    /// A withdrawal against this number was already recorded.
    #[error("Withdrawal against order {0} already exists")]
    DuplicateWithdrawal(OrderNumber),

    /// The withdrawal exceeds the current balance.
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: f64, available: f64 },

    /// A stored row could not be mapped back onto the domain types.
    #[error("Invalid order record: {0}")]
    InvalidRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
