//! PostgreSQL cart repository.

use sqlx::PgPool;

use crate::core_types::{CartId, CommodityId, UserId};
use crate::models::CartItem;

use super::PersistError;

const CART_COLUMNS: &str = "id, user_id, commodity_id, quantity, created_at, updated_at";

pub struct PgCartRepository {
    pool: PgPool,
}

impl PgCartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Add a line, or bump the quantity when the user already carries the
    /// commodity.
    pub async fn add_item(
        &self,
        user_id: UserId,
        commodity_id: CommodityId,
        quantity: i64,
    ) -> Result<CartItem, PersistError> {
        let row = sqlx::query_as::<_, CartItem>(&format!(
            r#"
            INSERT INTO carts (user_id, commodity_id, quantity, created_at, updated_at)
            VALUES ($1, $2, $3, now(), now())
            ON CONFLICT (user_id, commodity_id)
            DO UPDATE SET quantity = carts.quantity + EXCLUDED.quantity, updated_at = now()
            RETURNING {CART_COLUMNS}
            "#,
        ))
        .bind(user_id)
        .bind(commodity_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_quantity(&self, id: CartId, quantity: i64) -> Result<(), PersistError> {
        let result =
            sqlx::query("UPDATE carts SET quantity = $1, updated_at = now() WHERE id = $2")
                .bind(quantity)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(PersistError::NotFound);
        }
        Ok(())
    }

    pub async fn remove_item(&self, id: CartId, user_id: UserId) -> Result<(), PersistError> {
        let result = sqlx::query("DELETE FROM carts WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PersistError::NotFound);
        }
        Ok(())
    }

    pub async fn list_by_user(&self, user_id: UserId) -> Result<Vec<CartItem>, PersistError> {
        let rows = sqlx::query_as::<_, CartItem>(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
