//! GET /orders/{order_number} — confirmation page lookup

use axum::Json;
use axum::extract::{Path, State};
use shared::error::{AppError, ErrorCode};
use shared::models::Order;

use crate::error::ServiceResult;
use crate::state::AppState;

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> ServiceResult<Json<Order>> {
    let order = state
        .store
        .order_by_number(&order_number)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;
    Ok(Json(order))
}
