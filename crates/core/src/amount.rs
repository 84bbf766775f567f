//! Amount - non-negative integer minor units
//!
//! All monetary values in Tally are stored and computed as integer minor
//! units (cents). Decimal text only exists at the parsing and display
//! boundary, where rounding is half-up at two decimal places.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when constructing or parsing amounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount cannot be negative: {0}")]
    Negative(i64),

    #[error("Not a valid decimal amount: {0:?}")]
    NotANumber(String),

    #[error("Amount overflows minor-unit range")]
    Overflow,
}

/// A non-negative amount in minor currency units.
///
/// # Invariant
/// The inner value is always >= 0. This is enforced by the constructor.
///
/// # Example
/// ```
/// use tally_core::Amount;
///
/// let amount: Amount = "420.50".parse().unwrap();
/// assert_eq!(amount.minor_units(), 42050);
/// assert_eq!(amount.to_string(), "420.50");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    /// Zero amount constant
    pub const ZERO: Self = Self(0);

    /// Create a new Amount from minor units.
    ///
    /// Returns an error if the value is negative.
    pub fn from_minor_units(value: i64) -> Result<Self, AmountError> {
        if value < 0 {
            Err(AmountError::Negative(value))
        } else {
            Ok(Self(value))
        }
    }

    /// Create an Amount without validation.
    ///
    /// The caller MUST ensure the value is non-negative. Use only for
    /// trusted sources (e.g. rows read back from validated storage).
    #[inline]
    pub const fn from_minor_units_unchecked(value: i64) -> Self {
        Self(value)
    }

    /// Get the value in minor units
    #[inline]
    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    /// Check if the amount is zero
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Check if the amount is strictly positive
    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checked addition - None on overflow
    pub fn checked_add(&self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Subtraction clamped at zero (the running total never goes negative)
    pub fn saturating_sub(&self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0).max(0))
    }

    /// Convert to a Decimal in major units (e.g. 42050 -> 420.50)
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Convert a Decimal in major units to minor units, rounding half-up
    /// at two decimal places.
    pub fn from_decimal(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::NotANumber(value.to_string()));
        }
        let cents = (value * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let minor = cents.to_i64().ok_or(AmountError::Overflow)?;
        Self::from_minor_units(minor)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Accepts "420", "420.5", "420.50" and returns minor units.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value =
            Decimal::from_str(trimmed).map_err(|_| AmountError::NotANumber(trimmed.to_string()))?;
        Self::from_decimal(value).map_err(|e| match e {
            AmountError::NotANumber(_) => AmountError::NotANumber(trimmed.to_string()),
            other => other,
        })
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_minor_units(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}
