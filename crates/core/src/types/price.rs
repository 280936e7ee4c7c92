//! Type-safe price representation using decimal arithmetic.
//!
//! Prices are always non-negative. Discounts are applied with
//! [`Price::less_discount`], which floors the result at zero so a discount can
//! never drive a line negative.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::quantity::Quantity;

/// Errors that can occur when constructing or scaling a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative (got {0})")]
    Negative(Decimal),
    /// A price, subtotal or total does not fit in a `Decimal`.
    #[error("amount out of range")]
    Overflow,
}

/// A non-negative unit price in the store's currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// A price of zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` if `amount` is below zero.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative(amount));
        }
        Ok(Self(amount))
    }

    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Subtract a discount, flooring the result at zero.
    ///
    /// Negative discounts are ignored rather than raising the price.
    #[must_use]
    pub fn less_discount(self, discount: Decimal) -> Self {
        if discount <= Decimal::ZERO {
            return self;
        }
        Self((self.0 - discount).max(Decimal::ZERO))
    }

    /// Price scaled by a quantity.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if the product is out of range.
    pub fn times(self, quantity: Quantity) -> Result<Decimal, PriceError> {
        self.0
            .checked_mul(Decimal::from(quantity.get()))
            .ok_or(PriceError::Overflow)
    }
}

/// Sum amounts, failing instead of panicking on overflow.
///
/// # Errors
///
/// Returns `PriceError::Overflow` if the sum is out of range.
pub fn checked_sum<I>(amounts: I) -> Result<Decimal, PriceError>
where
    I: IntoIterator<Item = Decimal>,
{
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount).ok_or(PriceError::Overflow))
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
