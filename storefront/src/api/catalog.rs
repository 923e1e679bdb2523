//! GET /variants/{id}/availability

use axum::Json;
use axum::extract::{Path, State};
use shared::models::Availability;

use crate::error::ServiceResult;
use crate::state::AppState;

pub async fn availability(
    State(state): State<AppState>,
    Path(variant_id): Path<i64>,
) -> ServiceResult<Json<Availability>> {
    let available = state.ledger.available_stock(variant_id).await?;
    Ok(Json(Availability {
        variant_id,
        available,
    }))
}
