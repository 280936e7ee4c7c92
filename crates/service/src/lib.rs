//! Basket retrieval service.
//!
//! A cache-aside layer over a durable basket store. Every cache fill prices
//! the basket against a remote discount service; concurrent reads of the same
//! owner share one fill, and writes invalidate the owner's entry.
//!
//! - [`store`] - durable basket persistence
//! - [`discount`] - discount lookups with retry and circuit breaking
//! - [`cache`] - single-flight TTL cache
//! - [`service`] - [`BasketService`], the read/write entry point
//! - [`state`] - production wiring from [`BasketConfig`]

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod discount;
pub mod error;
pub mod service;
pub mod state;
pub mod store;

pub use cache::{DeadlineExceeded, PopulationState, SingleFlightCache};
pub use config::{BasketConfig, CacheConfig, ConfigError, DiscountConfig, TelemetryConfig};
pub use discount::{DiscountError, DiscountLookup};
pub use error::BasketError;
pub use service::{BasketItemInput, BasketService};
pub use state::{AppState, PgBasketService, StateError};
pub use store::{BasketStore, InMemoryBasketStore, PgBasketStore, StoreError};
