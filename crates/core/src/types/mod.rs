//! Core types for the basket domain.
//!
//! This module provides type-safe wrappers for keys, quantities and prices,
//! plus the stored [`Basket`] and its read-time [`PricedBasket`] view.

pub mod basket;
pub mod id;
pub mod price;
pub mod priced;
pub mod quantity;

pub use basket::{Basket, BasketItem};
pub use id::{KeyError, OwnerId, ProductId};
pub use price::{Price, PriceError};
pub use priced::{DiscountResult, PricedBasket, PricedItem};
pub use quantity::{Quantity, QuantityError};
