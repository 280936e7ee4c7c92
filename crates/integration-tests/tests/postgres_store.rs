//! `PgBasketStore` against a real database.
//!
//! These tests require a running `PostgreSQL` database reachable through
//! `BASKET_DATABASE_URL` (or `DATABASE_URL`). Migrations are applied first.
//!
//! Run with: cargo test -p basket-integration-tests -- --ignored

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use basket_core::{Basket, BasketItem, Price, ProductId, Quantity};
use basket_integration_tests::{dec, owner};
use basket_service::config::database_url_from_env;
use basket_service::store::{BasketStore, PgBasketStore, create_pool};

async fn store() -> PgBasketStore {
    let url = database_url_from_env().unwrap();
    let pool = create_pool(&url).await.unwrap();
    sqlx::migrate!("../service/migrations").run(&pool).await.unwrap();
    PgBasketStore::new(pool)
}

fn line(id: &str, name: &str, quantity: i64, price: &str) -> BasketItem {
    BasketItem {
        product_id: ProductId::parse(id).unwrap(),
        product_name: name.to_string(),
        quantity: Quantity::new(quantity).unwrap(),
        unit_price: Price::new(dec(price)).unwrap(),
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL (BASKET_DATABASE_URL)"]
async fn test_round_trip_preserves_order() {
    let store = store().await;
    let owner = owner("it-round-trip");
    store.delete(&owner).await.unwrap();

    let basket = Basket::new(
        owner.clone(),
        vec![
            line("p2", "Gadget", 1, "4.25"),
            line("p1", "Widget", 2, "10.00"),
            line("p3", "Sprocket", 7, "0.99"),
        ],
    );
    store.save(&basket).await.unwrap();

    let loaded = store.load(&owner).await.unwrap().unwrap();
    assert_eq!(loaded, basket);
    assert_eq!(loaded.items()[0].product_name, "Gadget");

    store.delete(&owner).await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL (BASKET_DATABASE_URL)"]
async fn test_empty_basket_is_not_missing() {
    let store = store().await;
    let owner = owner("it-empty");
    store.delete(&owner).await.unwrap();
    assert!(store.load(&owner).await.unwrap().is_none());

    store
        .save(&Basket::new(owner.clone(), vec![line("p1", "Widget", 1, "1.00")]))
        .await
        .unwrap();
    store.save(&Basket::empty(owner.clone())).await.unwrap();

    let loaded = store.load(&owner).await.unwrap();
    assert_eq!(loaded, Some(Basket::empty(owner.clone())));

    store.delete(&owner).await.unwrap();
    store.delete(&owner).await.unwrap();
    assert!(store.load(&owner).await.unwrap().is_none());
}
