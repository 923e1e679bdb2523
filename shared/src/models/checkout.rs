//! Checkout Model
//!
//! A checkout attempt groups the reservations held for one client's purchase
//! intent. The checkout token correlates reservations, the payment intent and
//! (once created) the order.

use serde::{Deserialize, Serialize};

use super::order::{ContactInfo, ShippingAddress};
use super::reservation::Reservation;

/// Checkout attempt lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutState {
    /// Reservations held, awaiting payment
    Active,
    /// Payment succeeded, reservations committed
    Completed,
    /// Cancelled, superseded or payment failed
    Released,
    /// Hold window elapsed without payment
    Expired,
}

impl CheckoutState {
    /// Parse from database string value (lowercase)
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "released" => Some(Self::Released),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Database string representation (lowercase)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Released => "released",
            Self::Expired => "expired",
        }
    }
}

/// Checkout attempt entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutAttempt {
    /// Opaque checkout token
    pub token: String,
    /// Client correlation key (session / customer hint) used for superseding
    pub client_key: Option<String>,
    pub payment_intent_id: Option<String>,
    /// Server-computed grand total, set once a payment intent exists
    pub total: Option<i64>,
    /// Unix millis
    pub created_at: i64,
    /// Unix millis, shared by all reservations of the attempt
    pub expires_at: i64,
    pub state: CheckoutState,
}

/// Cart line as submitted by the client.
///
/// Any price the client sends is ignored: serde drops unknown fields and the
/// server reprices every line from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemInput {
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub variant_id: Option<i64>,
    pub quantity: i64,
}

/// POST /checkout/init request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutInitRequest {
    pub items: Vec<CartItemInput>,
    #[serde(default)]
    pub customer_hint: Option<String>,
    /// Token of the caller's earlier attempt, released before the new hold
    #[serde(default)]
    pub previous_checkout_token: Option<String>,
}

/// POST /checkout/init success response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutInitResponse {
    pub checkout_token: String,
    pub reservations: Vec<Reservation>,
    /// Unix millis
    pub expires_at: i64,
    pub ttl_seconds: u64,
}

/// POST /checkout/cancel request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutCancelRequest {
    pub checkout_token: String,
}

/// GET /checkout/{token} response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStatusResponse {
    pub checkout_token: String,
    pub state: CheckoutState,
    pub expires_at: i64,
    pub reservations: Vec<Reservation>,
}

/// POST /payment-intent request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    /// Token from a previous checkout-init; a fresh hold is taken when absent or stale
    #[serde(default)]
    pub checkout_token: Option<String>,
    pub items: Vec<CartItemInput>,
    pub customer: ContactInfo,
    pub shipping: ShippingAddress,
    #[serde(default)]
    pub discount_code: Option<String>,
}

/// POST /payment-intent success response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    pub order_number: String,
    pub checkout_token: String,
    pub total: i64,
}
