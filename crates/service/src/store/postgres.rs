//! `PostgreSQL` basket store.
//!
//! Queries are built at runtime with `sqlx::query` so the crate compiles
//! without a live database.

use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use basket_core::{Basket, BasketItem, OwnerId, Price, ProductId, Quantity};

use super::{BasketStore, StoreError};

/// One row of the basket/item left join. Item columns are `NULL` for an
/// empty basket.
#[derive(Debug, sqlx::FromRow)]
struct BasketRow {
    product_id: Option<String>,
    product_name: Option<String>,
    quantity: Option<i32>,
    unit_price: Option<Decimal>,
}

/// Repository for basket database operations.
#[derive(Debug, Clone)]
pub struct PgBasketStore {
    pool: PgPool,
}

impl PgBasketStore {
    /// Create a new basket store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl BasketStore for PgBasketStore {
    /// Loads the basket and its items in one statement, so a concurrent
    /// `save` is seen either entirely or not at all.
    #[instrument(skip(self), fields(owner = %owner))]
    async fn load(&self, owner: &OwnerId) -> Result<Option<Basket>, StoreError> {
        let rows = sqlx::query_as::<_, BasketRow>(
            r"
            SELECT i.product_id, i.product_name, i.quantity, i.unit_price
            FROM basket.basket b
            LEFT JOIN basket.basket_item i ON i.owner_id = b.owner_id
            WHERE b.owner_id = $1
            ORDER BY i.position
            ",
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let items = rows
            .into_iter()
            .filter(|row| row.product_id.is_some())
            .map(row_to_item)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Basket::new(owner.clone(), items)))
    }

    #[instrument(skip(self, basket), fields(owner = %basket.owner(), items = basket.items().len()))]
    async fn save(&self, basket: &Basket) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO basket.basket (owner_id)
            VALUES ($1)
            ON CONFLICT (owner_id) DO UPDATE SET updated_at = now()
            ",
        )
        .bind(basket.owner().as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM basket.basket_item WHERE owner_id = $1")
            .bind(basket.owner().as_str())
            .execute(&mut *tx)
            .await?;

        for (position, item) in basket.items().iter().enumerate() {
            let position = i32::try_from(position).map_err(|_| {
                StoreError::DataCorruption(format!("basket has too many items ({position})"))
            })?;
            let quantity = i32::try_from(item.quantity.get()).map_err(|_| {
                StoreError::DataCorruption(format!("quantity out of range: {}", item.quantity))
            })?;

            sqlx::query(
                r"
                INSERT INTO basket.basket_item
                    (owner_id, position, product_id, product_name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(basket.owner().as_str())
            .bind(position)
            .bind(item.product_id.as_str())
            .bind(&item.product_name)
            .bind(quantity)
            .bind(item.unit_price.amount())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(owner = %owner))]
    async fn delete(&self, owner: &OwnerId) -> Result<(), StoreError> {
        // Items go with the basket row (ON DELETE CASCADE).
        sqlx::query("DELETE FROM basket.basket WHERE owner_id = $1")
            .bind(owner.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Convert a joined row into a validated item.
fn row_to_item(row: BasketRow) -> Result<BasketItem, StoreError> {
    let (Some(product_id), Some(product_name), Some(quantity), Some(unit_price)) =
        (row.product_id, row.product_name, row.quantity, row.unit_price)
    else {
        return Err(StoreError::DataCorruption(
            "basket item row has NULL columns".to_owned(),
        ));
    };

    let product_id = ProductId::parse(&product_id)
        .map_err(|e| StoreError::DataCorruption(format!("invalid product id in database: {e}")))?;
    let quantity = Quantity::new(i64::from(quantity))
        .map_err(|e| StoreError::DataCorruption(format!("invalid quantity in database: {e}")))?;
    let unit_price = Price::new(unit_price)
        .map_err(|e| StoreError::DataCorruption(format!("invalid price in database: {e}")))?;

    Ok(BasketItem {
        product_id,
        product_name,
        quantity,
        unit_price,
    })
}
