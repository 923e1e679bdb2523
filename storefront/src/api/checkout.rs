//! Checkout endpoints
//!
//! POST /checkout/init   — reprice + hold stock, 201
//! POST /checkout/cancel — release early, 204 (idempotent)
//! GET  /checkout/{token} — attempt state and reservations

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use shared::models::{
    CheckoutCancelRequest, CheckoutInitRequest, CheckoutInitResponse, CheckoutStatusResponse,
};

use super::extract::CheckoutJson;
use crate::checkout::CheckoutError;
use crate::state::AppState;

pub async fn init(
    State(state): State<AppState>,
    CheckoutJson(request): CheckoutJson<CheckoutInitRequest>,
) -> Result<(StatusCode, Json<CheckoutInitResponse>), CheckoutError> {
    let response = state.checkout.init_checkout(&request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn cancel(
    State(state): State<AppState>,
    CheckoutJson(request): CheckoutJson<CheckoutCancelRequest>,
) -> Result<StatusCode, CheckoutError> {
    state.checkout.cancel(&request.checkout_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<CheckoutStatusResponse>, CheckoutError> {
    Ok(Json(state.checkout.status(&token).await?))
}
