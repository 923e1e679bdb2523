//! POST /payment-intent — server-priced payment intent + pending order

use axum::Json;
use axum::extract::State;
use shared::models::{PaymentIntentRequest, PaymentIntentResponse};

use super::extract::CheckoutJson;
use crate::checkout::CheckoutError;
use crate::state::AppState;

pub async fn create_payment_intent(
    State(state): State<AppState>,
    CheckoutJson(request): CheckoutJson<PaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>, CheckoutError> {
    Ok(Json(state.checkout.create_payment_intent(&request).await?))
}
