//! In-process basket store for tests and local runs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use basket_core::{Basket, OwnerId};

use super::{BasketStore, StoreError};

/// A `HashMap` behind an async `RwLock`. Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBasketStore {
    baskets: Arc<RwLock<HashMap<OwnerId, Basket>>>,
}

impl InMemoryBasketStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored baskets.
    pub async fn len(&self) -> usize {
        self.baskets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.baskets.read().await.is_empty()
    }
}

impl BasketStore for InMemoryBasketStore {
    async fn load(&self, owner: &OwnerId) -> Result<Option<Basket>, StoreError> {
        Ok(self.baskets.read().await.get(owner).cloned())
    }

    async fn save(&self, basket: &Basket) -> Result<(), StoreError> {
        self.baskets
            .write()
            .await
            .insert(basket.owner().clone(), basket.clone());
        Ok(())
    }

    async fn delete(&self, owner: &OwnerId) -> Result<(), StoreError> {
        self.baskets.write().await.remove(owner);
        Ok(())
    }
}
