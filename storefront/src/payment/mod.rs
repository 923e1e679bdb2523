//! Payment provider integration
//!
//! - [`gateway`]: the provider seam used by checkout (create / cancel intent)
//! - [`stripe`]: Stripe REST client and webhook signature verification
//! - [`reconcile`]: applies verified webhook events to orders and reservations

pub mod gateway;
pub mod reconcile;
pub mod stripe;

use thiserror::Error;

pub use gateway::{CreateIntent, PaymentGateway, PaymentGatewayError, PaymentIntent};
pub use reconcile::{PaymentReconciler, ReconcileError, ReconcileOutcome};
pub use stripe::{StripeGateway, signature_header, verify_webhook_signature};

/// Inbound webhook rejected before any state is touched
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing Stripe-Signature header")]
    MissingSignature,
    #[error("{0}")]
    InvalidSignature(&'static str),
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}
