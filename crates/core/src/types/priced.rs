//! Read-time priced view of a basket.
//!
//! Built from a stored [`Basket`] plus one [`DiscountResult`] per item. Never
//! persisted, so a change to the discount schedule shows up on the next
//! read without touching stored data.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::basket::{Basket, BasketItem};
use super::id::{OwnerId, ProductId};
use super::price::{Price, PriceError, checked_sum};
use super::quantity::Quantity;

/// Outcome of a discount lookup for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "amount", rename_all = "snake_case")]
pub enum DiscountResult {
    /// Lookup succeeded; zero means "no discount".
    Applied(Decimal),
    /// Lookup failed or timed out; no discount was applied.
    Unavailable,
}

impl DiscountResult {
    /// Discount amount to subtract, zero when unavailable.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        match self {
            Self::Applied(amount) => *amount,
            Self::Unavailable => Decimal::ZERO,
        }
    }

    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// A basket line with its discount applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: Quantity,
    /// Undiscounted unit price, as stored.
    pub unit_price: Price,
    pub discount: DiscountResult,
    pub effective_unit_price: Price,
    pub subtotal: Decimal,
}

impl PricedItem {
    /// Apply `discount` to a stored line.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if the subtotal is out of range.
    pub fn new(item: BasketItem, discount: DiscountResult) -> Result<Self, PriceError> {
        let effective_unit_price = item.unit_price.less_discount(discount.amount());
        Ok(Self {
            subtotal: effective_unit_price.times(item.quantity)?,
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            discount,
            effective_unit_price,
        })
    }
}

/// A basket as returned to callers: discounted prices plus a degraded flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedBasket {
    pub owner: OwnerId,
    pub items: Vec<PricedItem>,
    pub total: Decimal,
    /// Set when at least one discount lookup failed.
    pub discounts_degraded: bool,
    pub priced_at: DateTime<Utc>,
}

impl PricedBasket {
    /// Price `basket`, taking each line's discount from `discount_for`.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if a subtotal or the total is out of
    /// range.
    pub fn price_with<F>(
        basket: Basket,
        priced_at: DateTime<Utc>,
        mut discount_for: F,
    ) -> Result<Self, PriceError>
    where
        F: FnMut(&BasketItem) -> DiscountResult,
    {
        let owner = basket.owner().clone();
        let items = basket
            .into_items()
            .into_iter()
            .map(|item| {
                let discount = discount_for(&item);
                PricedItem::new(item, discount)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            owner,
            total: checked_sum(items.iter().map(|i| i.subtotal))?,
            discounts_degraded: items.iter().any(|i| i.discount.is_unavailable()),
            items,
            priced_at,
        })
    }

    /// An empty priced basket.
    #[must_use]
    pub const fn empty(owner: OwnerId, priced_at: DateTime<Utc>) -> Self {
        Self {
            owner,
            items: Vec::new(),
            total: Decimal::ZERO,
            discounts_degraded: false,
            priced_at,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
