//! Unified service-layer error type for the storefront
//!
//! `ServiceError` bridges store errors (`StoreError`, `sqlx::Error`) and the
//! API-layer error (`AppError`). It enables `?` propagation in handlers
//! without per-call `map_err` + logging boilerplate.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};

use crate::inventory::ReservationError;
use crate::store::StoreError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Service-layer error, two variants:
///
/// - `Db`: persistence/infrastructure errors (logged once, mapped to DatabaseError)
/// - `App`: business-rule errors (passed through to the client)
#[derive(Debug)]
pub enum ServiceError {
    Db(BoxError),
    App(AppError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        if e.is_transient() {
            tracing::warn!(error = %e, "Store busy after retries");
            return ServiceError::App(AppError::new(ErrorCode::SystemBusy));
        }
        ServiceError::Db(e.into())
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Db(e.into())
    }
}

impl From<ReservationError> for ServiceError {
    fn from(e: ReservationError) -> Self {
        match e {
            ReservationError::Store(e) => e.into(),
            ReservationError::VariantNotFound(_) => {
                ServiceError::App(AppError::new(ErrorCode::VariantNotFound))
            }
            ReservationError::InsufficientStock(_) | ReservationError::BulkRejected(_) => {
                ServiceError::App(AppError::new(ErrorCode::InsufficientStock))
            }
            ReservationError::InvalidQuantity(_) => {
                ServiceError::App(AppError::new(ErrorCode::QuantityOutOfRange))
            }
            ReservationError::AlreadyHeld(_) => {
                ServiceError::App(AppError::new(ErrorCode::ReservationExists))
            }
        }
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Db(db_err) => {
                tracing::error!(error = %db_err, "Service database error");
                AppError::new(ErrorCode::DatabaseError)
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
