//! Stored basket types.
//!
//! A [`Basket`] is the authoritative, persisted shape: list prices only, item
//! order preserved for display. An empty basket is a real state and is not
//! the same thing as "no basket stored for this owner".

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{OwnerId, ProductId};
use super::price::{Price, PriceError, checked_sum};
use super::quantity::Quantity;

/// A single line in a stored basket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasketItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: Quantity,
    /// Undiscounted unit price.
    pub unit_price: Price,
}

impl BasketItem {
    /// List price scaled by quantity.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if the subtotal is out of range.
    pub fn subtotal(&self) -> Result<Decimal, PriceError> {
        self.unit_price.times(self.quantity)
    }
}

/// A stored basket belonging to one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Basket {
    owner: OwnerId,
    items: Vec<BasketItem>,
}

impl Basket {
    /// Create a basket from already-validated items.
    #[must_use]
    pub const fn new(owner: OwnerId, items: Vec<BasketItem>) -> Self {
        Self { owner, items }
    }

    /// An empty basket for `owner`.
    #[must_use]
    pub const fn empty(owner: OwnerId) -> Self {
        Self::new(owner, Vec::new())
    }

    #[must_use]
    pub const fn owner(&self) -> &OwnerId {
        &self.owner
    }

    #[must_use]
    pub fn items(&self) -> &[BasketItem] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<BasketItem> {
        self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of list-price subtotals.
    ///
    /// Discounts only lower prices, so a basket whose list total is in range
    /// can always be priced.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if a subtotal or the total is out of
    /// range.
    pub fn total(&self) -> Result<Decimal, PriceError> {
        let subtotals = self
            .items
            .iter()
            .map(BasketItem::subtotal)
            .collect::<Result<Vec<_>, _>>()?;
        checked_sum(subtotals)
    }
}
