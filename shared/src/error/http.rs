//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // 404 Not Found
            Self::CheckoutNotFound | Self::OrderNotFound | Self::VariantNotFound => {
                StatusCode::NOT_FOUND
            }

            // 401 Unauthorized
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,

            // 409 Conflict
            Self::ReservationExists => StatusCode::CONFLICT,

            // 429 Too Many Requests
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            // 502 Bad Gateway (payment provider failed upstream)
            Self::PaymentProviderError => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            Self::DatabaseError | Self::SystemBusy => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request
            Self::ValidationFailed
            | Self::InvalidRequest
            | Self::SignatureInvalid
            | Self::InsufficientStock
            | Self::QuantityOutOfRange => StatusCode::BAD_REQUEST,
        }
    }
}
