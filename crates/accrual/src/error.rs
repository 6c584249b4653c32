//! Accrual worker error types.

use common::OrderNumber;
use order_store::StoreError;
use thiserror::Error;

/// Errors that can occur while checking an order with the accrual service.
#[derive(Debug, Error)]
pub enum AccrualError {
    /// The request could not be sent or timed out.
    #[error("Accrual request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The accrual service answered with a status outside its contract.
    #[error("Accrual service answered with unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// A 200 response that does not carry JSON.
    #[error("Accrual service answered with content type '{0}', expected application/json")]
    UnexpectedContentType(String),

    /// The JSON body could not be decoded.
    #[error("Malformed accrual response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The accrual service reported an impossible amount.
    #[error("Accrual service reported a negative accrual of {0}")]
    NegativeAccrual(f64),

    /// The configured accrual service address is unusable.
    #[error("Invalid accrual service address '{0}'")]
    InvalidBaseUrl(String),

    /// Order store error.
    #[error("Order store error: {0}")]
    Store(#[from] StoreError),

    /// A queued order has no record in the store.
    #[error("Order {0} is not in the store")]
    UnknownOrder(OrderNumber),

    /// The worker pool has been shut down.
    #[error("Accrual worker pool is shut down")]
    PoolClosed,
}

impl AccrualError {
    /// Returns true for failures that may succeed when the check is repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            AccrualError::Transport(_)
            | AccrualError::UnexpectedStatus(_)
            | AccrualError::UnexpectedContentType(_)
            | AccrualError::Decode(_) => true,
            AccrualError::Store(err) => {
                matches!(err, StoreError::Database(_) | StoreError::Migration(_))
            }
            AccrualError::NegativeAccrual(_)
            | AccrualError::InvalidBaseUrl(_)
            | AccrualError::UnknownOrder(_)
            | AccrualError::PoolClosed => false,
        }
    }
}

/// Convenience type alias for accrual results.
pub type Result<T> = std::result::Result<T, AccrualError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_failures_are_transient() {
        assert!(AccrualError::UnexpectedStatus(500).is_transient());
        assert!(AccrualError::UnexpectedContentType("text/plain".into()).is_transient());
        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(AccrualError::Decode(decode).is_transient());
    }

    #[test]
    fn local_data_errors_are_not_retried() {
        let number: OrderNumber = "79927398713".parse().unwrap();
        assert!(!AccrualError::UnknownOrder(number).is_transient());
        assert!(!AccrualError::NegativeAccrual(-1.0).is_transient());
        assert!(!AccrualError::PoolClosed.is_transient());
        assert!(!AccrualError::Store(StoreError::OrderNotFound(number)).is_transient());
    }
}
