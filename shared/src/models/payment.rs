//! Payment provider events
//!
//! Inbound webhook deliveries are decoded into [`PaymentEvent`], a closed set
//! of the kinds the storefront acts on plus `Unknown` for everything else.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Raw webhook delivery (`{id, type, data: {object}}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub object: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventParseError {
    #[error("{event_type} event has no payment intent id")]
    MissingIntent { event_type: String },
}

/// Decoded payment event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    /// `payment_intent.succeeded`
    Succeeded {
        intent_id: String,
        amount_received: Option<i64>,
    },
    /// `payment_intent.payment_failed`
    Failed {
        intent_id: String,
        reason: Option<String>,
    },
    /// `payment_intent.canceled`
    Canceled { intent_id: String },
    /// `charge.refunded` (full refund of the intent's charge)
    Refunded { intent_id: String },
    /// Anything else; acknowledged and ignored
    Unknown(String),
}

impl PaymentEvent {
    pub fn from_envelope(envelope: &WebhookEnvelope) -> Result<Self, EventParseError> {
        let object = &envelope.data.object;
        let missing = || EventParseError::MissingIntent {
            event_type: envelope.event_type.clone(),
        };
        // Intent objects carry their own id; charges reference the intent
        let own_id = || object["id"].as_str().map(String::from).ok_or_else(missing);

        Ok(match envelope.event_type.as_str() {
            "payment_intent.succeeded" => Self::Succeeded {
                intent_id: own_id()?,
                amount_received: object["amount_received"].as_i64(),
            },
            "payment_intent.payment_failed" => Self::Failed {
                intent_id: own_id()?,
                reason: object["last_payment_error"]["message"]
                    .as_str()
                    .map(String::from),
            },
            "payment_intent.canceled" => Self::Canceled {
                intent_id: own_id()?,
            },
            "charge.refunded" => Self::Refunded {
                intent_id: object["payment_intent"]
                    .as_str()
                    .map(String::from)
                    .ok_or_else(missing)?,
            },
            other => Self::Unknown(other.to_string()),
        })
    }

    pub fn intent_id(&self) -> Option<&str> {
        match self {
            Self::Succeeded { intent_id, .. }
            | Self::Failed { intent_id, .. }
            | Self::Canceled { intent_id }
            | Self::Refunded { intent_id } => Some(intent_id),
            Self::Unknown(_) => None,
        }
    }
}
