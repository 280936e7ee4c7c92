//! Integration tests for the basket service.
//!
//! # Running Tests
//!
//! ```bash
//! # Service-level tests (no external dependencies)
//! cargo test -p basket-integration-tests
//!
//! # Including PostgreSQL tests
//! BASKET_DATABASE_URL=postgres://... cargo test -p basket-integration-tests -- --include-ignored
//! ```
//!
//! This library holds the fakes the tests share: a [`CountingStore`] that
//! records calls and can be slowed down or made to fail, and
//! [`ScriptedDiscounts`], a discount lookup answering from a table the test
//! can change between reads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use basket_core::{Basket, OwnerId};
use basket_service::{
    BasketItemInput, BasketService, BasketStore, CacheConfig, DiscountError, DiscountLookup,
    InMemoryBasketStore, StoreError,
};
use rust_decimal::Decimal;
use tokio::time::Instant;

/// Discount budget used by [`service`].
pub const DISCOUNT_TIMEOUT: Duration = Duration::from_millis(500);

/// In-memory store that counts calls.
///
/// `load` reads the stored basket before its delay and `save` writes before
/// its delay, so a slow call models a slow response, not a slow commit.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: InMemoryBasketStore,
    loads: AtomicUsize,
    saves: AtomicUsize,
    deletes: AtomicUsize,
    load_delay: Duration,
    save_delay: Duration,
    fail_loads: AtomicBool,
}

impl CountingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    #[must_use]
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    /// Make every following `load` fail as if the pool were closed.
    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// The backing store, bypassing counters and delays.
    #[must_use]
    pub const fn inner(&self) -> &InMemoryBasketStore {
        &self.inner
    }
}

impl BasketStore for CountingStore {
    async fn load(&self, owner: &OwnerId) -> Result<Option<Basket>, StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_loads.load(Ordering::SeqCst) {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        } else {
            self.inner.load(owner).await
        };
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        result
    }

    async fn save(&self, basket: &Basket) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(basket).await?;
        if !self.save_delay.is_zero() {
            tokio::time::sleep(self.save_delay).await;
        }
        Ok(())
    }

    async fn delete(&self, owner: &OwnerId) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(owner).await
    }
}

/// How [`ScriptedDiscounts`] answers for one product name.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Amount(Decimal),
    /// A transient failure (HTTP 503).
    Fail,
    /// Answer zero after the delay, unless the deadline passes first.
    Slow(Duration),
}

/// Discount lookup answering from a table. Unlisted names get zero.
///
/// The table can be changed between reads with [`ScriptedDiscounts::set`].
#[derive(Debug, Default)]
pub struct ScriptedDiscounts {
    scripts: Mutex<HashMap<String, Script>>,
    calls: AtomicUsize,
}

impl ScriptedDiscounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(self, product_name: &str, script: Script) -> Self {
        self.set(product_name, script);
        self
    }

    /// Change how `product_name` is answered from now on.
    pub fn set(&self, product_name: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(product_name.to_string(), script);
    }

    /// Shorthand for a fixed discount given as a decimal string.
    ///
    /// # Panics
    ///
    /// Panics if `amount` is not a decimal.
    #[must_use]
    pub fn with_amount(self, product_name: &str, amount: &str) -> Self {
        self.with(product_name, Script::Amount(dec(amount)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DiscountLookup for ScriptedDiscounts {
    async fn lookup(&self, product_name: &str, deadline: Instant) -> Result<Decimal, DiscountError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(product_name)
            .copied();
        match script {
            None => Ok(Decimal::ZERO),
            Some(Script::Amount(amount)) => Ok(amount),
            Some(Script::Fail) => Err(DiscountError::Api {
                status: 503,
                message: "scripted failure".to_string(),
            }),
            Some(Script::Slow(delay)) => {
                tokio::time::timeout_at(deadline, tokio::time::sleep(delay))
                    .await
                    .map_err(|_| DiscountError::Timeout)?;
                Ok(Decimal::ZERO)
            }
        }
    }
}

/// A service over the given fakes with default cache settings.
pub fn service<S: BasketStore, D: DiscountLookup>(store: S, discounts: D) -> BasketService<S, D> {
    BasketService::new(store, discounts, CacheConfig::default(), DISCOUNT_TIMEOUT)
}

/// # Panics
///
/// Panics if `id` is not a valid owner id.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn owner(id: &str) -> OwnerId {
    OwnerId::parse(id).unwrap()
}

/// # Panics
///
/// Panics if `value` is not a decimal.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

/// An item in the JSON shape callers submit.
#[must_use]
pub fn item(product_id: &str, product_name: &str, quantity: i64, unit_price: &str) -> BasketItemInput {
    BasketItemInput {
        product_id: product_id.to_string(),
        product_name: product_name.to_string(),
        quantity,
        unit_price: dec(unit_price),
    }
}

/// A deadline comfortably in the future.
#[must_use]
pub fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(2)
}
