//! Order record and its status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrderNumber, StoreError, UserId};

/// The status of an order in its accrual lifecycle.
///
/// State transitions:
/// ```text
/// New ──┬──► Processing ──┬──► Processed
///       │                 └──► Invalid
///       ├──► Processed
///       └──► Invalid
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Submitted, not yet seen by the accrual service.
    #[default]
    New,

    /// The accrual service knows the order and is still computing.
    Processing,

    /// The accrual service rejected or does not know the order (terminal state).
    Invalid,

    /// Accrual computed and stored (terminal state).
    Processed,
}

impl OrderStatus {
    /// Returns true if this is a terminal status (no further polling).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }

    /// Returns true if the order still needs to be polled.
    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns the status as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "INVALID" => Ok(OrderStatus::Invalid),
            "PROCESSED" => Ok(OrderStatus::Processed),
            other => Err(StoreError::InvalidRecord(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// A stored order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Store identity, assigned on creation.
    pub id: i64,
    pub number: OrderNumber,
    pub owner: UserId,
    pub status: OrderStatus,
    /// Cashback amount; only present once the order is `PROCESSED`.
    pub accrual: Option<f64>,
    pub submitted_at: DateTime<Utc>,
}

impl Order {
    /// Moves the order to a terminal `PROCESSED` status with the given amount.
    pub fn mark_processed(&mut self, accrual: f64) {
        self.status = OrderStatus::Processed;
        self.accrual = Some(accrual);
    }

    /// Moves the order to the terminal `INVALID` status.
    pub fn mark_invalid(&mut self) {
        self.status = OrderStatus::Invalid;
        self.accrual = None;
    }

    /// Marks the order as still being computed by the accrual service.
    ///
    /// Returns false when the order already was `PROCESSING`, so callers can
    /// skip a redundant write.
    pub fn mark_processing(&mut self) -> bool {
        if self.status == OrderStatus::Processing {
            return false;
        }
        self.status = OrderStatus::Processing;
        self.accrual = None;
        true
    }
}

/// Data required to create an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrder {
    pub number: OrderNumber,
    pub owner: UserId,
}

impl NewOrder {
    pub fn new(number: OrderNumber, owner: UserId) -> Self {
        Self { number, owner }
    }
}
