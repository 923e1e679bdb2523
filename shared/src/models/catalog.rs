//! Catalog Model (products and their purchasable variants)
//!
//! All monetary values are integer minor-currency units (cents).

use serde::{Deserialize, Serialize};

/// Product entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    pub name: String,
    /// Base price in cents
    pub base_price: i64,
    /// Merchandising switch: product can be sold at all
    pub in_stock: bool,
    pub is_active: bool,
}

/// Variant entity (product + option combination, e.g. size/colour)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Variant {
    pub id: i64,
    /// Product reference
    pub product_id: i64,
    pub name: String,
    /// Price modifier in cents, added to the product base price (may be negative)
    pub price_delta: i64,
    /// Physical stock quantity, never negative
    pub stock: i64,
    pub is_available: bool,
}

impl Variant {
    /// Display label used in user-facing messages ("Poster / A2")
    pub fn display_name(&self, product: &Product) -> String {
        format!("{} / {}", product.name, self.name)
    }
}

/// Stock availability read model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub variant_id: i64,
    pub available: i64,
}
