//! Reservation Model
//!
//! A reservation is a time-bounded soft hold against a variant's stock.
//!
//! ```text
//! active ──► committed   (payment succeeded)
//!    │
//!    ├─────► released    (cancelled / superseded / payment failed)
//!    │
//!    └─────► expired     (TTL elapsed, swept)
//! ```
//!
//! No transition leaves a terminal state.

use serde::{Deserialize, Serialize};

/// Reservation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationState {
    Active,
    Committed,
    Released,
    Expired,
}

impl ReservationState {
    /// Parse from database string value (lowercase)
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "committed" => Some(Self::Committed),
            "released" => Some(Self::Released),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Database string representation (lowercase)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::Released => "released",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Only `active` may move, and only into a terminal state.
    pub fn can_transition_to(&self, next: ReservationState) -> bool {
        matches!(self, Self::Active) && next.is_terminal()
    }
}

/// Reservation entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: i64,
    pub variant_id: i64,
    pub quantity: i64,
    /// Owning checkout attempt
    pub checkout_token: String,
    /// Unix millis
    pub created_at: i64,
    /// Unix millis
    pub expires_at: i64,
    pub state: ReservationState,
}

impl Reservation {
    /// Counts against available stock: active and not yet past expiry
    pub fn is_holding(&self, now: i64) -> bool {
        self.state == ReservationState::Active && self.expires_at > now
    }
}
