//! CLI subcommands.

pub mod basket;
pub mod migrate;

use basket_core::KeyError;
use basket_service::{BasketError, ConfigError, StateError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Startup error: {0}")]
    State(#[from] StateError),

    #[error("{0}")]
    Basket(#[from] BasketError),

    #[error("Invalid owner: {0}")]
    InvalidOwner(#[from] KeyError),

    #[error("Could not read items: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid items JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Either --items or --file is required")]
    MissingItems,
}
