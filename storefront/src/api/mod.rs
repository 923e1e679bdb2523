//! API routes for the storefront

pub mod catalog;
pub mod checkout;
pub mod cron;
mod extract;
pub mod health;
pub mod orders;
pub mod payment;
pub mod stripe_webhook;

use crate::auth::rate_limit::{checkout_rate_limit, payment_rate_limit};
use crate::auth::require_cron_secret;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::{Router, middleware};

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Checkout (rate limited per client IP)
    let checkout = Router::new()
        .route("/checkout/init", post(checkout::init))
        .route("/checkout/cancel", post(checkout::cancel))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            checkout_rate_limit,
        ));

    let payment = Router::new()
        .route("/payment-intent", post(payment::create_payment_intent))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            payment_rate_limit,
        ));

    // Stripe webhook (signature-verified, raw body)
    let webhook = Router::new().route("/stripe/webhook", post(stripe_webhook::handle_webhook));

    // Scheduler entry point (bearer token)
    let cron = Router::new()
        .route("/cron/cleanup", get(cron::cleanup))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_cron_secret,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/checkout/{token}", get(checkout::status))
        .route("/variants/{id}/availability", get(catalog::availability))
        .route("/orders/{order_number}", get(orders::get_order))
        .merge(checkout)
        .merge(payment)
        .merge(webhook)
        .merge(cron)
        .with_state(state)
}
