//! Durable basket storage.
//!
//! # Database: `basket` schema
//!
//! ## Tables
//!
//! - `basket.basket` - One row per owner; its presence distinguishes an empty
//!   basket from "no basket"
//! - `basket.basket_item` - Ordered lines, list prices only
//!
//! # Migrations
//!
//! Migrations are stored in `crates/service/migrations/` and run via:
//! ```bash
//! cargo run -p basket-cli -- migrate
//! ```
//!
//! Stores do not retry and do not cache. Failures propagate unchanged to the
//! caller.

mod memory;
mod postgres;

use std::future::Future;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use basket_core::{Basket, OwnerId};

pub use memory::InMemoryBasketStore;
pub use postgres::PgBasketStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database violates basket invariants.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Authoritative key-value persistence for baskets, keyed by owner.
pub trait BasketStore: Send + Sync {
    /// Load the basket for `owner`, `None` if no basket is stored.
    fn load(
        &self,
        owner: &OwnerId,
    ) -> impl Future<Output = Result<Option<Basket>, StoreError>> + Send;

    /// Replace the whole basket for its owner, creating it if absent.
    fn save(&self, basket: &Basket) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete the basket for `owner`. Deleting a missing basket succeeds.
    fn delete(&self, owner: &OwnerId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
