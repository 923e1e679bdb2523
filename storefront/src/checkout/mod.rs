//! Checkout Orchestrator
//!
//! Turns a client cart into held stock (checkout-init) and later into a
//! pending order with a payment intent. Orders are only ever created at
//! payment-intent time; init reserves and nothing else.

pub mod service;

use axum::Json;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

use crate::error::ServiceError;
use crate::inventory::ReservationError;
use crate::payment::PaymentGatewayError;
use crate::store::StoreError;

pub use service::CheckoutService;

#[derive(Debug, Error)]
pub enum CheckoutError {
    /// User-correctable input problems, one message per problem
    #[error("invalid checkout: {}", .0.join("; "))]
    Invalid(Vec<String>),
    /// Stock could not be held, one message per affected item
    #[error("insufficient stock: {}", .0.join("; "))]
    OutOfStock(Vec<String>),
    #[error("checkout not found")]
    NotFound,
    #[error(transparent)]
    Gateway(#[from] PaymentGatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ReservationError> for CheckoutError {
    fn from(e: ReservationError) -> Self {
        match e {
            ReservationError::Store(e) => Self::Store(e),
            other => Self::Invalid(vec![other.to_string()]),
        }
    }
}

/// `{code, error, errors}`: the code's status and message plus one entry per problem
fn rejected(code: ErrorCode, errors: Vec<String>) -> Response {
    (
        code.http_status(),
        Json(json!({ "code": code.code(), "error": code.message(), "errors": errors })),
    )
        .into_response()
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        match self {
            Self::Invalid(errors) => rejected(ErrorCode::ValidationFailed, errors),
            Self::OutOfStock(errors) => rejected(ErrorCode::InsufficientStock, errors),
            Self::NotFound => AppError::new(ErrorCode::CheckoutNotFound).into_response(),
            Self::Gateway(e) => {
                tracing::error!(error = %e, "Payment provider call failed");
                AppError::new(ErrorCode::PaymentProviderError).into_response()
            }
            Self::Store(e) => ServiceError::from(e).into_response(),
        }
    }
}
