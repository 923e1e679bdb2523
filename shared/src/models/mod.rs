//! Data models
//!
//! Shared between the storefront server and its clients (via API).
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! Catalog IDs are `i64`, timestamps are Unix millis, money is integer cents.

pub mod catalog;
pub mod checkout;
pub mod order;
pub mod payment;
pub mod reservation;

// Re-exports
pub use catalog::*;
pub use checkout::*;
pub use order::*;
pub use payment::*;
pub use reservation::*;
