//! Orders, line items and stock alerts

use shared::models::{ContactInfo, Order, OrderItem, OrderTotals, PaymentStatus, ShippingAddress};
use sqlx::PgPool;

use crate::store::StockAlert;

const ORDER_COLUMNS: &str = "id, order_number, checkout_token, payment_intent_id,
    customer_email, customer_name, customer_phone,
    ship_line1, ship_line2, ship_city, ship_postal_code, ship_country,
    subtotal, shipping, discount, total, discount_code,
    payment_status, oversell_risk, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    order_number: String,
    checkout_token: String,
    payment_intent_id: String,
    customer_email: String,
    customer_name: String,
    customer_phone: Option<String>,
    ship_line1: String,
    ship_line2: Option<String>,
    ship_city: String,
    ship_postal_code: String,
    ship_country: String,
    subtotal: i64,
    shipping: i64,
    discount: i64,
    total: i64,
    discount_code: Option<String>,
    payment_status: String,
    oversell_risk: bool,
    created_at: i64,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    product_id: i64,
    variant_id: Option<i64>,
    name: String,
    quantity: i64,
    unit_price: i64,
    line_total: i64,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, sqlx::Error> {
        let payment_status = PaymentStatus::from_db(&self.payment_status)
            .ok_or_else(|| super::bad_column("orders.payment_status", &self.payment_status))?;
        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            checkout_token: self.checkout_token,
            payment_intent_id: self.payment_intent_id,
            customer: ContactInfo {
                email: self.customer_email,
                name: self.customer_name,
                phone: self.customer_phone,
            },
            shipping_address: ShippingAddress {
                line1: self.ship_line1,
                line2: self.ship_line2,
                city: self.ship_city,
                postal_code: self.ship_postal_code,
                country: self.ship_country,
            },
            items,
            totals: OrderTotals {
                subtotal: self.subtotal,
                shipping: self.shipping,
                discount: self.discount,
                total: self.total,
            },
            discount_code: self.discount_code,
            payment_status,
            oversell_risk: self.oversell_risk,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub async fn create(pool: &PgPool, order: &Order) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(&format!(
        "INSERT INTO orders ({ORDER_COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)"
    ))
    .bind(order.id)
    .bind(&order.order_number)
    .bind(&order.checkout_token)
    .bind(&order.payment_intent_id)
    .bind(&order.customer.email)
    .bind(&order.customer.name)
    .bind(&order.customer.phone)
    .bind(&order.shipping_address.line1)
    .bind(&order.shipping_address.line2)
    .bind(&order.shipping_address.city)
    .bind(&order.shipping_address.postal_code)
    .bind(&order.shipping_address.country)
    .bind(order.totals.subtotal)
    .bind(order.totals.shipping)
    .bind(order.totals.discount)
    .bind(order.totals.total)
    .bind(&order.discount_code)
    .bind(order.payment_status.as_db())
    .bind(order.oversell_risk)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *tx)
    .await?;

    for (position, item) in order.items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO order_items (order_id, position, product_id, variant_id, name, quantity, unit_price, line_total)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(order.id)
        .bind(position as i32)
        .bind(item.product_id)
        .bind(item.variant_id)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.line_total)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn load_items(pool: &PgPool, order_id: i64) -> Result<Vec<OrderItem>, sqlx::Error> {
    let rows: Vec<OrderItemRow> = sqlx::query_as(
        "SELECT product_id, variant_id, name, quantity, unit_price, line_total
         FROM order_items WHERE order_id = $1 ORDER BY position",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| OrderItem {
            product_id: r.product_id,
            variant_id: r.variant_id,
            name: r.name,
            quantity: r.quantity,
            unit_price: r.unit_price,
            line_total: r.line_total,
        })
        .collect())
}

async fn hydrate(pool: &PgPool, row: Option<OrderRow>) -> Result<Option<Order>, sqlx::Error> {
    match row {
        Some(row) => {
            let items = load_items(pool, row.id).await?;
            row.into_order(items).map(Some)
        }
        None => Ok(None),
    }
}

pub async fn find_by_intent(
    pool: &PgPool,
    payment_intent_id: &str,
) -> Result<Option<Order>, sqlx::Error> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_intent_id = $1"
    ))
    .bind(payment_intent_id)
    .fetch_optional(pool)
    .await?;
    hydrate(pool, row).await
}

pub async fn find_by_number(pool: &PgPool, order_number: &str) -> Result<Option<Order>, sqlx::Error> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
    ))
    .bind(order_number)
    .fetch_optional(pool)
    .await?;
    hydrate(pool, row).await
}

/// Conditional status update: only from the statuses allowed to reach `next`
pub async fn transition_payment_status(
    pool: &PgPool,
    payment_intent_id: &str,
    next: PaymentStatus,
    now: i64,
) -> Result<Option<Order>, sqlx::Error> {
    let sources: Vec<String> = PaymentStatus::allowed_sources(next)
        .iter()
        .map(|s| s.as_db().to_string())
        .collect();
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "UPDATE orders SET payment_status = $1, updated_at = $2
         WHERE payment_intent_id = $3 AND payment_status = ANY($4)
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(next.as_db())
    .bind(now)
    .bind(payment_intent_id)
    .bind(&sources)
    .fetch_optional(pool)
    .await?;
    hydrate(pool, row).await
}

pub async fn flag_oversell_risk(
    pool: &PgPool,
    payment_intent_id: &str,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET oversell_risk = TRUE, updated_at = $1 WHERE payment_intent_id = $2")
        .bind(now)
        .bind(payment_intent_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_stock_alert(pool: &PgPool, alert: &StockAlert) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO stock_alerts (kind, payment_intent_id, order_number, variant_id, quantity, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(alert.kind)
    .bind(&alert.payment_intent_id)
    .bind(&alert.order_number)
    .bind(alert.variant_id)
    .bind(alert.quantity)
    .bind(alert.created_at)
    .execute(pool)
    .await?;
    Ok(())
}
