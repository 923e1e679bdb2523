//! Order Model
//!
//! Orders are created pending when a payment intent is issued and are then
//! only mutated by payment reconciliation. Line items carry a price snapshot
//! that is never recomputed.

use serde::{Deserialize, Serialize};

/// Order payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    /// Parse from database string value (lowercase)
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    /// Database string representation (lowercase)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    /// Statuses an order may move to from `self`.
    ///
    /// A failed intent can still be retried by the customer, so `failed`
    /// may later become `paid` or `cancelled`.
    pub fn allowed_sources(next: PaymentStatus) -> &'static [PaymentStatus] {
        match next {
            Self::Pending => &[],
            Self::Paid => &[Self::Pending, Self::Failed],
            Self::Failed => &[Self::Pending],
            Self::Cancelled => &[Self::Pending, Self::Failed],
            Self::Refunded => &[Self::Paid],
        }
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        Self::allowed_sources(next).contains(self)
    }
}

/// Customer contact info
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Shipping address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// Computed totals, all in cents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: i64,
    pub shipping: i64,
    pub discount: i64,
    pub total: i64,
}

/// Order line item (price snapshot)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    /// Display name at the time of purchase
    pub name: String,
    pub quantity: i64,
    /// Unit price in cents
    pub unit_price: i64,
    /// quantity * unit_price
    pub line_total: i64,
}

/// Order entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    /// Human-facing unique order number
    pub order_number: String,
    pub checkout_token: String,
    /// Payment provider intent handle (unique)
    pub payment_intent_id: String,
    pub customer: ContactInfo,
    pub shipping_address: ShippingAddress,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub discount_code: Option<String>,
    pub payment_status: PaymentStatus,
    /// Paid after its hold lapsed and stock could not be consumed
    pub oversell_risk: bool,
    /// Unix millis
    pub created_at: i64,
    /// Unix millis
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_transitions() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Failed.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Refunded));

        assert!(!Paid.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Cancelled));
        assert!(!Paid.can_transition_to(Failed));
        assert!(!Cancelled.can_transition_to(Paid));
        assert!(!Refunded.can_transition_to(Paid));
        assert!(!Pending.can_transition_to(Refunded));
    }

    #[test]
    fn test_payment_status_db() {
        assert_eq!(PaymentStatus::from_db("cancelled"), Some(PaymentStatus::Cancelled));
        assert_eq!(PaymentStatus::Refunded.as_db(), "refunded");
        assert_eq!(PaymentStatus::from_db("canceled"), None);
    }
}
