//! Basket Core - Shared basket and pricing types.
//!
//! This crate provides the domain types used by the basket retrieval path:
//! - `service` - Cache-aside basket service with discount enrichment
//! - `cli` - Command-line tools for migrations and basket management
//!
//! # Architecture
//!
//! The core crate contains only types and pure pricing arithmetic - no I/O,
//! no database access, no HTTP clients. Stored baskets always carry list
//! prices; discounts only exist on [`PricedBasket`], which is computed at read
//! time and never persisted.
//!
//! # Modules
//!
//! - [`types`] - Owner and product keys, quantities, prices, baskets

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
