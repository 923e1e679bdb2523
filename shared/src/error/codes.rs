//! Unified error codes for the storefront
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 3xxx: Checkout / reservation errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Product / inventory errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Validation failed
    ValidationFailed = 2,
    /// Invalid request
    InvalidRequest = 5,
    /// Rate limit exceeded
    TooManyRequests = 9,

    // ==================== 1xxx: Auth ====================
    /// Caller is not authenticated
    NotAuthenticated = 1001,
    /// Webhook signature missing or invalid
    SignatureInvalid = 1008,

    // ==================== 3xxx: Checkout ====================
    /// Checkout attempt not found
    CheckoutNotFound = 3001,
    /// Not enough stock to satisfy the request
    InsufficientStock = 3005,
    /// The checkout already holds this variant
    ReservationExists = 3006,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,

    // ==================== 5xxx: Payment ====================
    /// Payment provider returned an error
    PaymentProviderError = 5006,

    // ==================== 6xxx: Product ====================
    /// Variant not found
    VariantNotFound = 6004,
    /// Quantity outside the allowed range
    QuantityOutOfRange = 6005,

    // ==================== 9xxx: System ====================
    /// Database error
    DatabaseError = 9002,
    /// Store busy (lock contention exhausted retries)
    SystemBusy = 9404,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::TooManyRequests => "Too many requests, try again later",

            // Auth
            ErrorCode::NotAuthenticated => "Authentication required",
            ErrorCode::SignatureInvalid => "Signature is missing or invalid",

            // Checkout
            ErrorCode::CheckoutNotFound => "Checkout not found",
            ErrorCode::InsufficientStock => "Insufficient stock",
            ErrorCode::ReservationExists => "Variant is already reserved for this checkout",

            // Order
            ErrorCode::OrderNotFound => "Order not found",

            // Payment
            ErrorCode::PaymentProviderError => "Payment provider error",

            // Product
            ErrorCode::VariantNotFound => "Variant not found",
            ErrorCode::QuantityOutOfRange => "Quantity is out of range",

            // System
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::SystemBusy => "System busy, please retry later",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            2 => Ok(ErrorCode::ValidationFailed),
            5 => Ok(ErrorCode::InvalidRequest),
            9 => Ok(ErrorCode::TooManyRequests),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1008 => Ok(ErrorCode::SignatureInvalid),

            // Checkout
            3001 => Ok(ErrorCode::CheckoutNotFound),
            3005 => Ok(ErrorCode::InsufficientStock),
            3006 => Ok(ErrorCode::ReservationExists),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),

            // Payment
            5006 => Ok(ErrorCode::PaymentProviderError),

            // Product
            6004 => Ok(ErrorCode::VariantNotFound),
            6005 => Ok(ErrorCode::QuantityOutOfRange),

            // System
            9002 => Ok(ErrorCode::DatabaseError),
            9404 => Ok(ErrorCode::SystemBusy),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
