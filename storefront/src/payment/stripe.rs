//! Stripe integration via REST API (no SDK dependency)

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::WebhookError;
use super::gateway::{CreateIntent, PaymentGateway, PaymentGatewayError, PaymentIntent};

pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: secret_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

fn stripe_error(resp: &serde_json::Value) -> PaymentGatewayError {
    let message = resp["error"]["message"]
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| resp.to_string());
    PaymentGatewayError::Rejected(message)
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        request: &CreateIntent<'_>,
    ) -> Result<PaymentIntent, PaymentGatewayError> {
        let amount = request.amount.to_string();
        let resp: serde_json::Value = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", request.idempotency_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", request.currency),
                ("automatic_payment_methods[enabled]", "true"),
                ("receipt_email", request.receipt_email),
                ("metadata[order_number]", request.order_number),
                ("metadata[checkout_token]", request.checkout_token),
            ])
            .send()
            .await?
            .json()
            .await?;

        match (resp["id"].as_str(), resp["client_secret"].as_str()) {
            (Some(id), Some(secret)) => Ok(PaymentIntent {
                id: id.to_string(),
                client_secret: secret.to_string(),
            }),
            _ => Err(stripe_error(&resp)),
        }
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<(), PaymentGatewayError> {
        let resp: serde_json::Value = self
            .client
            .post(format!("{}/v1/payment_intents/{intent_id}/cancel", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?
            .json()
            .await?;

        if resp["status"].as_str() == Some("canceled") {
            Ok(())
        } else {
            Err(stripe_error(&resp))
        }
    }
}

fn hmac_hex(secret: &str, timestamp: &str, payload: &[u8]) -> Result<Hmac<Sha256>, WebhookError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature("HMAC key error"))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Verify Stripe webhook signature (HMAC-SHA256 over `"{t}.{body}"`).
///
/// Any of the `v1=` entries may match (Stripe sends several while a secret
/// is being rolled). Events outside `tolerance_secs` of `now_secs` are rejected.
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    tolerance_secs: i64,
    now_secs: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    if timestamp.is_empty() || signatures.is_empty() {
        return Err(WebhookError::InvalidSignature("Invalid Stripe-Signature header"));
    }

    // constant-time comparison via verify_slice
    let matched = signatures.iter().any(|sig| {
        let Ok(sig_bytes) = hex::decode(sig) else {
            return false;
        };
        hmac_hex(secret, timestamp, payload).is_ok_and(|mac| mac.verify_slice(&sig_bytes).is_ok())
    });
    if !matched {
        return Err(WebhookError::InvalidSignature("Webhook signature mismatch"));
    }

    // Replay window
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| WebhookError::InvalidSignature("Invalid timestamp"))?;
    if (now_secs - ts).abs() > tolerance_secs {
        return Err(WebhookError::InvalidSignature("Webhook timestamp outside tolerance"));
    }

    Ok(())
}

/// Build a `Stripe-Signature` header value for `payload` (used by tests and tooling)
pub fn signature_header(payload: &[u8], secret: &str, timestamp_secs: i64) -> String {
    let ts = timestamp_secs.to_string();
    let digest = match hmac_hex(secret, &ts, payload) {
        Ok(mac) => hex::encode(mac.finalize().into_bytes()),
        Err(_) => String::new(),
    };
    format!("t={ts},v1={digest}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_800_000_000;

    #[test]
    fn test_valid_signature() {
        let body = br#"{"id":"evt_1"}"#;
        let header = signature_header(body, SECRET, NOW);
        assert!(verify_webhook_signature(body, &header, SECRET, 300, NOW + 10).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = signature_header(br#"{"id":"evt_1"}"#, SECRET, NOW);
        let err = verify_webhook_signature(br#"{"id":"evt_2"}"#, &header, SECRET, 300, NOW);
        assert!(matches!(err, Err(WebhookError::InvalidSignature(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"{}";
        let header = signature_header(body, "other", NOW);
        assert!(verify_webhook_signature(body, &header, SECRET, 300, NOW).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let body = b"{}";
        let header = signature_header(body, SECRET, NOW - 301);
        assert!(verify_webhook_signature(body, &header, SECRET, 300, NOW).is_err());
    }

    #[test]
    fn test_any_v1_may_match() {
        let body = b"{}";
        let good = signature_header(body, SECRET, NOW);
        let digest = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1=deadbeef,v1={digest}");
        assert!(verify_webhook_signature(body, &header, SECRET, 300, NOW).is_ok());
    }

    #[test]
    fn test_malformed_header() {
        assert!(verify_webhook_signature(b"{}", "garbage", SECRET, 300, NOW).is_err());
        assert!(verify_webhook_signature(b"{}", "t=1", SECRET, 300, NOW).is_err());
    }
}
