//! Catalog reads

use shared::models::{Product, Variant};
use sqlx::PgPool;

pub async fn find_product(pool: &PgPool, id: i64) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(
        "SELECT id, name, base_price, in_stock, is_active FROM products WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn find_variant(pool: &PgPool, id: i64) -> Result<Option<Variant>, sqlx::Error> {
    sqlx::query_as::<_, Variant>(
        "SELECT id, product_id, name, price_delta, stock, is_available FROM variants WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
