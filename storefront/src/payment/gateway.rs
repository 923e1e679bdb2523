//! Payment provider seam

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentGatewayError {
    /// Network / transport failure talking to the provider
    #[error("payment provider unreachable: {0}")]
    Transport(String),
    /// Provider answered with an error object
    #[error("payment provider rejected request: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for PaymentGatewayError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Parameters for a new payment intent
#[derive(Debug, Clone)]
pub struct CreateIntent<'a> {
    /// Server-computed grand total in cents
    pub amount: i64,
    pub currency: &'a str,
    /// Replays of the same key return the same intent
    pub idempotency_key: &'a str,
    pub order_number: &'a str,
    pub checkout_token: &'a str,
    pub receipt_email: &'a str,
}

/// Intent handle returned by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        request: &CreateIntent<'_>,
    ) -> Result<PaymentIntent, PaymentGatewayError>;

    async fn cancel_intent(&self, intent_id: &str) -> Result<(), PaymentGatewayError>;
}
