//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! basket migrate
//! ```
//!
//! # Environment Variables
//!
//! - `BASKET_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! Migrations live in `crates/service/migrations/` and are embedded at
//! compile time.

use basket_service::config::database_url_from_env;
use basket_service::store::create_pool;

use super::CommandError;

/// Run basket database migrations.
pub async fn run() -> Result<(), CommandError> {
    let database_url = database_url_from_env()?;

    tracing::info!("Connecting to basket database...");
    let pool = create_pool(&database_url).await?;

    tracing::info!("Running basket migrations...");
    sqlx::migrate!("../service/migrations").run(&pool).await?;

    tracing::info!("Basket migrations complete");
    Ok(())
}
