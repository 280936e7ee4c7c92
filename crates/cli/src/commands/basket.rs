//! Basket inspection commands.
//!
//! These run the full service stack (store, cache, discount lookups), so a
//! `get` shows exactly what a caller of the service would see.
//!
//! # Environment Variables
//!
//! See `basket_service::config` for the full list; `BASKET_DATABASE_URL` and
//! `DISCOUNT_API_URL` are required.

use std::path::PathBuf;

use basket_core::{OwnerId, PricedBasket};
use basket_service::{AppState, BasketConfig, BasketItemInput};

use super::CommandError;

/// Source of the JSON item array for `put`.
#[derive(Debug)]
pub enum ItemsInput {
    Inline(String),
    File(PathBuf),
}

impl ItemsInput {
    async fn load(self) -> Result<Vec<BasketItemInput>, CommandError> {
        let json = match self {
            Self::Inline(json) => json,
            Self::File(path) => tokio::fs::read_to_string(path).await?,
        };
        parse_items(&json)
    }
}

fn parse_items(json: &str) -> Result<Vec<BasketItemInput>, CommandError> {
    Ok(serde_json::from_str(json)?)
}

async fn connect() -> Result<AppState, CommandError> {
    let config = BasketConfig::from_env()?;
    Ok(AppState::connect(config).await?)
}

/// Print the priced basket for `owner`.
pub async fn get(owner: &str) -> Result<(), CommandError> {
    let owner = OwnerId::parse(owner)?;
    let state = connect().await?;

    let basket = state.service().get_basket(&owner, state.deadline()).await?;
    print_basket(&basket)
}

/// Replace the basket for `owner`, then print it as it now reads.
pub async fn put(owner: &str, items: ItemsInput) -> Result<(), CommandError> {
    let owner = OwnerId::parse(owner)?;
    let items = items.load().await?;
    let state = connect().await?;

    state
        .service()
        .store_basket(&owner, items, state.deadline())
        .await?;

    let basket = state.service().get_basket(&owner, state.deadline()).await?;
    print_basket(&basket)
}

/// Delete the basket for `owner`.
pub async fn delete(owner: &str) -> Result<(), CommandError> {
    let owner = OwnerId::parse(owner)?;
    let state = connect().await?;

    state
        .service()
        .delete_basket(&owner, state.deadline())
        .await?;

    tracing::info!(owner = %owner, "Basket deleted");
    Ok(())
}

fn print_basket(basket: &PricedBasket) -> Result<(), CommandError> {
    let json = serde_json::to_string_pretty(basket)?;

    #[allow(clippy::print_stdout)]
    {
        println!("{json}");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_items() {
        let items = parse_items(
            r#"[{"productId":"p1","productName":"Widget","quantity":2,"unitPrice":"10.00"}]"#,
        )
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_name, "Widget");
        assert_eq!(items[0].quantity, 2);
    }

    #[test]
    fn test_parse_items_rejects_object() {
        assert!(matches!(
            parse_items(r#"{"productId":"p1"}"#),
            Err(CommandError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_inline_items_load() {
        let items = ItemsInput::Inline("[]".to_string()).load().await.unwrap();
        assert!(items.is_empty());
    }
}
