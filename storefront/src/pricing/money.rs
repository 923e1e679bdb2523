//! Money calculation utilities
//!
//! Amounts are integer cents. Percentage discounts go through `Decimal` and
//! are rounded half away from zero at the cent boundary.

use rust_decimal::prelude::*;
use shared::models::OrderTotals;

use super::PricingConfig;

/// Discount granted by a promo code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountKind {
    /// Whole percent of the subtotal
    Percent(u32),
    /// Fixed amount in cents
    Fixed(i64),
}

const DISCOUNT_CODES: &[(&str, DiscountKind)] = &[
    ("WELCOME10", DiscountKind::Percent(10)),
    ("SAVE5", DiscountKind::Fixed(500)),
    ("PRINT20", DiscountKind::Percent(20)),
];

/// Canonical form of a promo code (trimmed, uppercase)
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Look up a promo code, case-insensitively. Unknown codes yield `None`.
pub fn lookup_discount(code: &str) -> Option<(&'static str, DiscountKind)> {
    let normalized = normalize_code(code);
    DISCOUNT_CODES
        .iter()
        .find(|(known, _)| *known == normalized)
        .copied()
}

/// Percentage of an amount in cents, rounded half-up to the nearest cent
pub fn percent_of(amount: i64, percent: u32) -> i64 {
    let value = Decimal::from(amount) * Decimal::from(percent) / Decimal::ONE_HUNDRED;
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// Flat fee below the free-shipping threshold, zero at or above it
pub fn calculate_shipping(subtotal: i64, config: &PricingConfig) -> i64 {
    if subtotal >= config.free_shipping_threshold {
        0
    } else {
        config.shipping_flat_fee
    }
}

/// Discount in cents for `code` on `subtotal`; unknown codes are silently 0
pub fn apply_discount_code(code: &str, subtotal: i64) -> i64 {
    match lookup_discount(code) {
        Some((_, DiscountKind::Percent(p))) => percent_of(subtotal, p),
        Some((_, DiscountKind::Fixed(amount))) => amount,
        None => 0,
    }
}

/// subtotal + shipping - discount, clamped at zero
pub fn calculate_order_total(
    subtotal: i64,
    discount_code: Option<&str>,
    config: &PricingConfig,
) -> OrderTotals {
    let shipping = calculate_shipping(subtotal, config);
    let discount = discount_code.map_or(0, |code| apply_discount_code(code, subtotal));
    OrderTotals {
        subtotal,
        shipping,
        discount,
        total: (subtotal + shipping - discount).max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_without_discount() {
        let totals = calculate_order_total(1299, None, &PricingConfig::default());
        assert_eq!(totals.shipping, 500);
        assert_eq!(totals.discount, 0);
        assert_eq!(totals.total, 1799);
    }

    #[test]
    fn test_total_with_welcome10() {
        let totals = calculate_order_total(1299, Some("WELCOME10"), &PricingConfig::default());
        assert_eq!(totals.discount, 130);
        assert_eq!(totals.total, 1669);
    }

    #[test]
    fn test_total_never_negative() {
        let totals = calculate_order_total(100, Some("SAVE5"), &PricingConfig::default());
        assert_eq!(totals.discount, 500);
        assert_eq!(totals.total, 100);

        let cheap = PricingConfig {
            shipping_flat_fee: 0,
            free_shipping_threshold: 0,
        };
        assert_eq!(calculate_order_total(300, Some("save5"), &cheap).total, 0);
    }

    #[test]
    fn test_shipping_threshold() {
        let config = PricingConfig::default();
        assert_eq!(calculate_shipping(4999, &config), 500);
        assert_eq!(calculate_shipping(5000, &config), 0);
        assert_eq!(calculate_shipping(0, &config), 500);
    }

    #[test]
    fn test_discount_case_insensitive() {
        assert_eq!(apply_discount_code("welcome10", 10000), 1000);
        assert_eq!(apply_discount_code("WELCOME10", 10000), 1000);
        assert_eq!(apply_discount_code("  Welcome10 ", 10000), 1000);
        assert_eq!(apply_discount_code("BOGUS", 10000), 0);
        assert_eq!(apply_discount_code("", 10000), 0);
    }

    #[test]
    fn test_percent_rounding_half_up() {
        // 1299 * 10% = 129.9
        assert_eq!(percent_of(1299, 10), 130);
        // 1025 * 20% = 205.0, 1234 * 20% = 246.8, 1245 * 10% = 124.5
        assert_eq!(percent_of(1025, 20), 205);
        assert_eq!(percent_of(1234, 20), 247);
        assert_eq!(percent_of(1245, 10), 125);
        assert_eq!(percent_of(1244, 10), 124);
    }
}
