//! storefront — checkout inventory control for the print shop
//!
//! - Pricing Oracle: server-side repricing of every cart
//! - Stock Ledger / Reservation Manager: time-bounded holds, commit on payment
//! - Checkout Orchestrator: checkout-init and payment-intent flows
//! - Payment Reconciliation: idempotent Stripe webhook processing
//! - Expiry Sweeper: reclaims lapsed holds

pub mod api;
pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod db;
pub mod error;
pub mod inventory;
pub mod logger;
pub mod payment;
pub mod pricing;
pub mod state;
pub mod store;
pub mod sweeper;
pub mod validation;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::AppState;

/// Full HTTP surface with access logging
pub fn build_router(state: AppState) -> Router {
    api::create_router(state).layer(TraceLayer::new_for_http())
}
