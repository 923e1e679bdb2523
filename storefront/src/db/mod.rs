//! Database access layer (PostgreSQL)
//!
//! Free functions over `PgPool`, one module per table group. State-changing
//! functions are single conditional statements or short transactions that
//! take row locks in a fixed order (variants by id, then reservations).

pub mod catalog;
pub mod checkouts;
pub mod orders;
pub mod rate_limits;
pub mod reservations;
pub mod webhook_events;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Decode failure for an enum column holding an unexpected value
pub(crate) fn bad_column(column: &str, value: &str) -> sqlx::Error {
    let err: BoxError = format!("unexpected {column} value: {value}").into();
    sqlx::Error::Decode(err)
}
