//! Application state: the production wiring of the basket service.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::time::Instant;

use crate::config::BasketConfig;
use crate::discount::{DiscountError, HttpDiscountClient, ResilientDiscountLookup};
use crate::service::BasketService;
use crate::store::{PgBasketStore, create_pool};

/// Basket service backed by `PostgreSQL` and the HTTP discount service.
pub type PgBasketService = BasketService<PgBasketStore, ResilientDiscountLookup<HttpDiscountClient>>;

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("discount client setup failed: {0}")]
    Discount(#[from] DiscountError),
}

/// Shared application state.
///
/// This struct is cheaply cloneable via `Arc`; every clone shares one cache
/// and one discount circuit breaker.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: BasketConfig,
    service: PgBasketService,
}

impl AppState {
    /// Connect to the database and build the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot connect or the discount client
    /// cannot be built.
    pub async fn connect(config: BasketConfig) -> Result<Self, StateError> {
        let pool = create_pool(&config.database_url).await?;
        Self::new(config, pool)
    }

    /// Build the service on an existing pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the discount client cannot be built.
    pub fn new(config: BasketConfig, pool: PgPool) -> Result<Self, StateError> {
        let client = HttpDiscountClient::new(&config.discount)?;
        let service = BasketService::new(
            PgBasketStore::new(pool),
            ResilientDiscountLookup::new(client, &config.discount),
            config.cache,
            config.discount.lookup_timeout,
        );

        Ok(Self {
            inner: Arc::new(AppStateInner { config, service }),
        })
    }

    #[must_use]
    pub fn service(&self) -> &PgBasketService {
        &self.inner.service
    }

    /// Deadline for a call starting now, per `BASKET_REQUEST_TIMEOUT_MS`.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.inner.config.request_timeout
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.inner.config)
            .field("service", &self.inner.service)
            .finish()
    }
}
