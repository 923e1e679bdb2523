//! Pricing Oracle
//!
//! Recomputes every price from the catalog. Nothing the client sends about
//! money is read: a cart line is only (product, variant, quantity).
//! [`price_cart`] is a pure function over a [`CatalogSnapshot`].

pub mod money;

use shared::models::{CartItemInput, OrderItem, OrderTotals};
use thiserror::Error;

use crate::catalog::CatalogSnapshot;

pub use money::{apply_discount_code, calculate_order_total, calculate_shipping};

/// Allowed quantity per cart line
pub const MIN_QUANTITY: i64 = 1;
pub const MAX_QUANTITY: i64 = 99;

/// Shipping parameters (cents)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingConfig {
    pub shipping_flat_fee: i64,
    pub free_shipping_threshold: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            shipping_flat_fee: 500,
            free_shipping_threshold: 5000,
        }
    }
}

/// Per-line validation failure. `item` is the 1-based cart position.
///
/// Messages are user-facing and never contain internal identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Item {item}: product not found")]
    ProductNotFound { item: usize },
    #[error("Item {item}: selected option not found")]
    VariantNotFound { item: usize },
    #[error("Item {item}: selected option does not belong to this product")]
    VariantMismatch { item: usize },
    #[error("Item {item}: quantity must be between 1 and 99")]
    QuantityOutOfRange { item: usize },
    #[error("Item {item}: {name} is out of stock")]
    OutOfStock { item: usize, name: String },
}

/// One server-priced cart line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub name: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub line_total: i64,
}

impl From<&PricedLine> for OrderItem {
    fn from(line: &PricedLine) -> Self {
        OrderItem {
            product_id: line.product_id,
            variant_id: line.variant_id,
            name: line.name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total,
        }
    }
}

/// Pricing snapshot for a whole cart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub totals: OrderTotals,
    /// Canonical code when it was recognised, `None` otherwise
    pub discount_code: Option<String>,
}

impl PricedCart {
    pub fn order_items(&self) -> Vec<OrderItem> {
        self.lines.iter().map(OrderItem::from).collect()
    }
}

fn price_line(
    item: usize,
    input: &CartItemInput,
    snapshot: &CatalogSnapshot,
) -> Result<PricedLine, PricingError> {
    if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&input.quantity) {
        return Err(PricingError::QuantityOutOfRange { item });
    }

    let variant = match input.variant_id {
        Some(id) => Some(
            snapshot
                .variant(id)
                .ok_or(PricingError::VariantNotFound { item })?,
        ),
        None => None,
    };

    let product_id = match (input.product_id, variant) {
        (Some(pid), Some(v)) if v.product_id != pid => {
            return Err(PricingError::VariantMismatch { item });
        }
        (_, Some(v)) => v.product_id,
        (Some(pid), None) => pid,
        (None, None) => return Err(PricingError::ProductNotFound { item }),
    };

    let product = snapshot
        .product(product_id)
        .filter(|p| p.is_active)
        .ok_or(PricingError::ProductNotFound { item })?;

    let name = match variant {
        Some(v) => v.display_name(product),
        None => product.name.clone(),
    };
    if !product.in_stock || variant.is_some_and(|v| !v.is_available) {
        return Err(PricingError::OutOfStock { item, name });
    }

    let unit_price = product.base_price + variant.map_or(0, |v| v.price_delta);
    Ok(PricedLine {
        product_id,
        variant_id: variant.map(|v| v.id),
        name,
        quantity: input.quantity,
        unit_price,
        line_total: unit_price * input.quantity,
    })
}

/// Price a cart from the catalog snapshot.
///
/// Returns every line's failure, not just the first.
pub fn price_cart(
    snapshot: &CatalogSnapshot,
    items: &[CartItemInput],
    discount_code: Option<&str>,
    config: &PricingConfig,
) -> Result<PricedCart, Vec<PricingError>> {
    if items.is_empty() {
        return Err(vec![PricingError::EmptyCart]);
    }

    let mut lines = Vec::with_capacity(items.len());
    let mut errors = Vec::new();
    for (idx, input) in items.iter().enumerate() {
        match price_line(idx + 1, input, snapshot) {
            Ok(line) => lines.push(line),
            Err(e) => errors.push(e),
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let subtotal = lines.iter().map(|l| l.line_total).sum();
    let recognised = discount_code
        .and_then(money::lookup_discount)
        .map(|(code, _)| code);
    Ok(PricedCart {
        lines,
        totals: calculate_order_total(subtotal, recognised, config),
        discount_code: recognised.map(str::to_string),
    })
}
