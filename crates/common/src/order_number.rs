//! Purchase-order numbers and their Luhn admission check.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons an order number is rejected at admission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderNumberError {
    /// The input is empty or contains something other than decimal digits.
    #[error("Order number must be a non-empty string of decimal digits")]
    NotNumeric,

    /// The number is zero or does not fit the store's signed 64-bit column.
    #[error("Order number {0} is out of range")]
    OutOfRange(String),

    /// The mod-10 Luhn checksum does not hold.
    #[error("Order number {0} fails the Luhn checksum")]
    ChecksumMismatch(u64),
}

/// A positive, Luhn-valid purchase-order number.
///
/// Construction always validates, so holding an `OrderNumber` means the
/// admission precondition has been enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct OrderNumber(u64);

impl OrderNumber {
    /// Validates a raw number.
    pub fn new(number: u64) -> Result<Self, OrderNumberError> {
        if number == 0 || number > i64::MAX as u64 {
            return Err(OrderNumberError::OutOfRange(number.to_string()));
        }
        if !luhn_valid(number) {
            return Err(OrderNumberError::ChecksumMismatch(number));
        }
        Ok(Self(number))
    }

    /// Returns the raw number.
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Returns the number as stored in a `BIGINT` column.
    ///
    /// Lossless: construction rejects values above `i64::MAX`.
    pub fn as_i64(&self) -> i64 {
        self.0 as i64
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OrderNumber {
    type Err = OrderNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OrderNumberError::NotNumeric);
        }
        let number: u64 = s
            .parse()
            .map_err(|_| OrderNumberError::OutOfRange(s.to_string()))?;
        Self::new(number)
    }
}

impl TryFrom<u64> for OrderNumber {
    type Error = OrderNumberError;

    fn try_from(number: u64) -> Result<Self, Self::Error> {
        Self::new(number)
    }
}

impl TryFrom<i64> for OrderNumber {
    type Error = OrderNumberError;

    fn try_from(number: i64) -> Result<Self, Self::Error> {
        let number =
            u64::try_from(number).map_err(|_| OrderNumberError::OutOfRange(number.to_string()))?;
        Self::new(number)
    }
}

impl From<OrderNumber> for u64 {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

/// Standard mod-10 Luhn checksum over the decimal digits of `number`.
pub fn luhn_valid(mut number: u64) -> bool {
    let mut sum = 0;
    let mut double = false;
    while number > 0 {
        let mut digit = number % 10;
        if double {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        double = !double;
        number /= 10;
    }
    sum % 10 == 0
}
