//! Money types
//!
//! Domain primitives for joining fees and settled amounts. Values are
//! validated at construction time so an invalid fee cannot reach the ledger
//! or the payment gateway.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum joining fee / payment amount (one million in major units)
const MAX_AMOUNT: i64 = 1_000_000;

/// Maximum decimal places (currency minor units)
const MAX_SCALE: u32 = 2;

/// Amount represents a strictly positive monetary value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum 2 decimal places
/// - Maximum value is 1,000,000
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use event_settlement::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(2000, 2)).unwrap();
/// assert_eq!(amount.to_minor_units(), 2000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

/// Errors that can occur when creating a money value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount must not be negative (got {0})")]
    Negative(Decimal),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

fn check_bounds(value: Decimal) -> Result<Decimal, AmountError> {
    // Trailing zeros ("20.000") should not count against the scale limit
    let value = value.normalize();
    if value.scale() > MAX_SCALE {
        return Err(AmountError::TooManyDecimals(value.scale()));
    }
    if value > Decimal::from(MAX_AMOUNT) {
        return Err(AmountError::Overflow);
    }
    Ok(value)
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if more than 2 decimal places
    /// - `AmountError::Overflow` if value > 1,000,000
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }
        check_bounds(value).map(Self)
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Amount in currency minor units (cents), as the gateway expects it.
    pub fn to_minor_units(&self) -> i64 {
        // Bounded by MAX_AMOUNT * 100, always fits
        (self.0 * Decimal::ONE_HUNDRED).trunc().to_i64().unwrap_or(i64::MAX)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s).map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::from_str(&value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        format!("{:.2}", amount.0)
    }
}

/// JoiningFee is the price of one admission. Unlike Amount it can be zero,
/// which marks the event as free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JoiningFee(Decimal);

impl JoiningFee {
    /// Create a new fee (zero or positive)
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value < Decimal::ZERO {
            return Err(AmountError::Negative(value));
        }
        check_bounds(value).map(Self)
    }

    /// A free event
    pub fn free() -> Self {
        Self(Decimal::ZERO)
    }

    /// Get the underlying value
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_free(&self) -> bool {
        self.0.is_zero()
    }

    /// The fee as a chargeable amount, `None` for free events
    pub fn as_amount(&self) -> Option<Amount> {
        Amount::new(self.0).ok()
    }
}

impl Default for JoiningFee {
    fn default() -> Self {
        Self::free()
    }
}

impl fmt::Display for JoiningFee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for JoiningFee {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s).map_err(|e| AmountError::ParseError(e.to_string()))?;
        JoiningFee::new(decimal)
    }
}

impl TryFrom<String> for JoiningFee {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        JoiningFee::from_str(&value)
    }
}

impl From<JoiningFee> for String {
    fn from(fee: JoiningFee) -> Self {
        format!("{:.2}", fee.0)
    }
}
