//! Stripe webhook handler
//!
//! POST /stripe/webhook — payment events (raw body for signature verification)
//!
//! Only verification failures are rejected. Every verified delivery is
//! acknowledged with 200, including ignored event types and deliveries whose
//! processing failed (logged with event id and intent), so the provider does
//! not go into a retry storm.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use shared::error::{AppError, ErrorCode};
use shared::models::{PaymentEvent, WebhookEnvelope};

use crate::payment::{ReconcileOutcome, WebhookError, verify_webhook_signature};
use crate::state::AppState;

fn reject(error: WebhookError) -> Response {
    tracing::warn!(error = %error, "Webhook rejected");
    let code = match error {
        WebhookError::InvalidPayload(_) => ErrorCode::InvalidRequest,
        WebhookError::MissingSignature | WebhookError::InvalidSignature(_) => {
            ErrorCode::SignatureInvalid
        }
    };
    AppError::with_message(code, error.to_string()).into_response()
}

fn received() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "received": true }))).into_response()
}

/// Handle incoming Stripe webhook events
///
/// Must receive raw body (not JSON) for HMAC signature verification.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // 1. Get Stripe-Signature header
    let Some(sig_header) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        return reject(WebhookError::MissingSignature);
    };

    // 2. Verify signature
    let now_secs = chrono::Utc::now().timestamp();
    if let Err(e) = verify_webhook_signature(
        &body,
        sig_header,
        &state.config.stripe_webhook_secret,
        state.config.webhook_tolerance_secs,
        now_secs,
    ) {
        return reject(e);
    }

    // 3. Parse event envelope
    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return reject(WebhookError::InvalidPayload(e.to_string())),
    };

    tracing::info!(
        event_id = %envelope.id,
        event_type = %envelope.event_type,
        "Received Stripe webhook"
    );

    // 4. Reconcile (idempotent on event id)
    match state.reconciler.process(&envelope).await {
        Ok(ReconcileOutcome::Applied) => {
            tracing::info!(event_id = %envelope.id, "Webhook event applied");
        }
        Ok(outcome) => {
            tracing::debug!(event_id = %envelope.id, ?outcome, "Webhook event required no change");
        }
        Err(e) => {
            let intent = PaymentEvent::from_envelope(&envelope)
                .ok()
                .and_then(|ev| ev.intent_id().map(String::from));
            tracing::error!(
                event_id = %envelope.id,
                event_type = %envelope.event_type,
                payment_intent = intent.as_deref().unwrap_or("-"),
                error = %e,
                "Webhook processing failed"
            );
        }
    }

    received()
}
