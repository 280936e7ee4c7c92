//! Basket reads and writes.
//!
//! Reads go through the [`SingleFlightCache`]: on a miss one caller loads the
//! basket from the store and every concurrent caller for the same owner
//! shares that load. The cache holds list prices only; each read prices its
//! snapshot against the discount service, so a discount change shows up on
//! the next read. Writes go straight to the store and then invalidate the
//! owner's cache entry.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use basket_core::{Basket, BasketItem, DiscountResult, OwnerId, Price, PricedBasket, ProductId, Quantity};

use crate::cache::{PopulationState, SingleFlightCache};
use crate::config::CacheConfig;
use crate::discount::DiscountLookup;
use crate::error::{BasketError, Result};
use crate::store::BasketStore;

type BasketCache = SingleFlightCache<OwnerId, Basket, BasketError>;

/// One line of a basket write, as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasketItemInput {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Decimal,
}

impl BasketItemInput {
    /// Validate into a stored line.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a blank product id, a quantity below 1,
    /// a negative unit price, or a subtotal too large to represent.
    pub fn validate(self) -> Result<BasketItem> {
        let invalid = |e: &dyn std::fmt::Display| BasketError::InvalidArgument(e.to_string());

        let item = BasketItem {
            product_id: ProductId::parse(&self.product_id).map_err(|e| invalid(&e))?,
            quantity: Quantity::new(self.quantity).map_err(|e| invalid(&e))?,
            unit_price: Price::new(self.unit_price).map_err(|e| invalid(&e))?,
            product_name: self.product_name,
        };
        item.subtotal().map_err(|e| invalid(&e))?;
        Ok(item)
    }
}

/// Validate every line, naming the first offending one.
fn validate_items(items: Vec<BasketItemInput>) -> Result<Vec<BasketItem>> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, input)| {
            input.validate().map_err(|err| match err {
                BasketError::InvalidArgument(msg) => {
                    BasketError::InvalidArgument(format!("item {index}: {msg}"))
                }
                other => other,
            })
        })
        .collect()
}

/// Invalidates an owner's cache entry when dropped, so a write that is
/// cancelled mid-flight still clears whatever it may have replaced.
struct InvalidateOnDrop<'a> {
    cache: &'a BasketCache,
    owner: &'a OwnerId,
}

impl Drop for InvalidateOnDrop<'_> {
    fn drop(&mut self) {
        self.cache.invalidate(self.owner);
    }
}

/// Cache-aside basket service.
#[derive(Debug)]
pub struct BasketService<S, D> {
    store: S,
    discounts: D,
    cache: BasketCache,
    discount_timeout: Duration,
}

impl<S: BasketStore, D: DiscountLookup> BasketService<S, D> {
    /// `discount_timeout` bounds all discount lookups made while pricing one
    /// basket.
    pub fn new(store: S, discounts: D, cache: CacheConfig, discount_timeout: Duration) -> Self {
        Self {
            store,
            discounts,
            cache: SingleFlightCache::new(cache),
            discount_timeout,
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn discounts(&self) -> &D {
        &self.discounts
    }

    /// Cache state for `owner`, for diagnostics.
    pub fn cache_state(&self, owner: &OwnerId) -> PopulationState {
        self.cache.state(owner)
    }

    /// Fetch the priced basket for `owner`.
    ///
    /// An owner with no stored basket gets an empty one. Discounts are looked
    /// up on every call, cached or not. Failed lookups leave the affected
    /// lines at list price and set `discounts_degraded`; they never fail the
    /// read.
    ///
    /// # Errors
    ///
    /// `Timeout` if `deadline` passes before the basket is loaded, `Internal`
    /// if the stored basket cannot be priced, otherwise the store's error.
    #[instrument(skip(self, deadline), fields(owner = %owner))]
    pub async fn get_basket(&self, owner: &OwnerId, deadline: Instant) -> Result<PricedBasket> {
        let basket = self
            .cache
            .get_or_populate(owner, deadline, || self.load(owner))
            .await?;
        self.price(basket, deadline).await
    }

    /// Replace the basket for `owner` with `items`.
    ///
    /// Nothing is written if any item is invalid. The cache entry is
    /// invalidated after every write attempt, successful or not.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a bad item, `Timeout` if `deadline` passes, or the
    /// store's error.
    #[instrument(skip(self, items, deadline), fields(owner = %owner, items = items.len()))]
    pub async fn store_basket(
        &self,
        owner: &OwnerId,
        items: Vec<BasketItemInput>,
        deadline: Instant,
    ) -> Result<()> {
        let basket = Basket::new(owner.clone(), validate_items(items)?);
        basket
            .total()
            .map_err(|e| BasketError::InvalidArgument(format!("basket total: {e}")))?;

        let invalidate = InvalidateOnDrop {
            cache: &self.cache,
            owner,
        };
        let result = tokio::time::timeout_at(deadline, self.store.save(&basket)).await;
        drop(invalidate);

        match result {
            Ok(Ok(())) => {
                info!("Basket stored");
                Ok(())
            }
            Ok(Err(err)) => {
                error!(error = %err, "Failed to store basket");
                Err(err.into())
            }
            Err(_) => {
                warn!("Basket write timed out and may still commit");
                Err(BasketError::Timeout("basket write".to_string()))
            }
        }
    }

    /// Delete the basket for `owner`. Deleting a missing basket succeeds.
    ///
    /// # Errors
    ///
    /// `Timeout` if `deadline` passes first, otherwise the store's error.
    #[instrument(skip(self, deadline), fields(owner = %owner))]
    pub async fn delete_basket(&self, owner: &OwnerId, deadline: Instant) -> Result<()> {
        let invalidate = InvalidateOnDrop {
            cache: &self.cache,
            owner,
        };
        let result = tokio::time::timeout_at(deadline, self.store.delete(owner)).await;
        drop(invalidate);

        match result {
            Ok(Ok(())) => {
                info!("Basket deleted");
                Ok(())
            }
            Ok(Err(err)) => {
                error!(error = %err, "Failed to delete basket");
                Err(err.into())
            }
            Err(_) => {
                warn!("Basket delete timed out and may still commit");
                Err(BasketError::Timeout("basket delete".to_string()))
            }
        }
    }

    /// Populate function for a cache miss.
    async fn load(&self, owner: &OwnerId) -> Result<Basket> {
        match self.store.load(owner).await {
            Ok(basket) => Ok(basket.unwrap_or_else(|| Basket::empty(owner.clone()))),
            Err(err) => {
                error!(error = %err, "Failed to load basket");
                Err(err.into())
            }
        }
    }

    /// Apply current discounts to a list-price snapshot.
    async fn price(&self, basket: Basket, deadline: Instant) -> Result<PricedBasket> {
        let discounts = self.lookup_discounts(&basket, deadline).await;
        PricedBasket::price_with(basket, Utc::now(), |item| {
            discounts
                .get(&item.product_name)
                .copied()
                .unwrap_or(DiscountResult::Unavailable)
        })
        .map_err(|err| {
            error!(error = %err, "Stored basket cannot be priced");
            BasketError::Internal(err.to_string())
        })
    }

    /// One concurrent lookup per distinct product name.
    async fn lookup_discounts(
        &self,
        basket: &Basket,
        deadline: Instant,
    ) -> HashMap<String, DiscountResult> {
        let mut seen = HashSet::new();
        let names: Vec<&str> = basket
            .items()
            .iter()
            .map(|item| item.product_name.as_str())
            .filter(|name| seen.insert(*name))
            .collect();

        let lookup_deadline = deadline.min(Instant::now() + self.discount_timeout);
        let lookups = names.into_iter().map(|name| async move {
            let result = match self.discounts.lookup(name, lookup_deadline).await {
                Ok(amount) => DiscountResult::Applied(amount),
                Err(err) => {
                    warn!(product = %name, error = %err, "Discount unavailable, using list price");
                    DiscountResult::Unavailable
                }
            };
            (name.to_string(), result)
        });

        join_all(lookups).await.into_iter().collect()
    }
}
