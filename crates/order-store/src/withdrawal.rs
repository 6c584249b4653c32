//! Withdrawals of accrued cashback and the resulting balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OrderNumber, UserId};

/// A recorded withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: i64,
    /// Order number the withdrawal is paid against; unique across withdrawals.
    pub number: OrderNumber,
    pub owner: UserId,
    pub sum: f64,
    pub processed_at: DateTime<Utc>,
}

/// Data required to record a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewWithdrawal {
    pub number: OrderNumber,
    pub owner: UserId,
    pub sum: f64,
}

impl NewWithdrawal {
    pub fn new(number: OrderNumber, owner: UserId, sum: f64) -> Self {
        Self { number, owner, sum }
    }
}

/// Cashback position of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Accruals of `PROCESSED` orders minus everything withdrawn.
    pub current: f64,
    pub withdrawn: f64,
}

impl Balance {
    /// Builds the balance from the accrued and withdrawn totals.
    pub fn from_totals(accrued: f64, withdrawn: f64) -> Self {
        Self {
            current: accrued - withdrawn,
            withdrawn,
        }
    }

    pub fn covers(&self, sum: f64) -> bool {
        sum <= self.current
    }
}
