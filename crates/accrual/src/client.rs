//! Accrual service client trait and response model.

use std::time::Duration;

use async_trait::async_trait;
use common::OrderNumber;
use order_store::OrderStatus;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Order status as reported by the accrual service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    /// Known to the service, computation not started.
    Registered,
    /// Computation in progress.
    Processing,
    /// The service refuses to award cashback for the order.
    Invalid,
    /// Accrual computed.
    Processed,
    /// Any vendor-defined status this client does not know.
    #[serde(other)]
    Unknown,
}

impl RemoteStatus {
    /// Maps the remote status onto the local order status it implies.
    ///
    /// Returns None for statuses that carry no usable verdict.
    pub fn local_status(&self) -> Option<OrderStatus> {
        match self {
            RemoteStatus::Registered | RemoteStatus::Processing => Some(OrderStatus::Processing),
            RemoteStatus::Invalid => Some(OrderStatus::Invalid),
            RemoteStatus::Processed => Some(OrderStatus::Processed),
            RemoteStatus::Unknown => None,
        }
    }
}

/// JSON body of a `200` answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: RemoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
}

/// Classified answer of the accrual service for one order.
///
/// Transport and protocol failures are reported as `Err(AccrualError)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The service does not know the order (`204`).
    NotFound,
    /// The service asks the caller to slow down (`429`).
    Throttled { retry_after: Option<Duration> },
    /// The service reported a status for the order (`200`).
    Ready(AccrualResponse),
}

/// Trait for querying the external accrual service.
#[async_trait]
pub trait AccrualClient: Send + Sync {
    /// Asks the service about one order and classifies the answer.
    async fn query(&self, number: OrderNumber) -> Result<Outcome>;
}
