//! Stock Ledger + Reservation Manager
//!
//! Reservations only hold stock; commit consumes it. The Reservation Manager
//! is the sole mutator of physical stock.

pub mod ledger;
pub mod manager;
pub mod retry;

use thiserror::Error;

use crate::store::StoreError;

pub use ledger::StockLedger;
pub use manager::{ReservationManager, ReservationRequest};
pub use retry::RetryPolicy;

/// Units asked for vs units free at the time of the check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockShortfall {
    pub variant_id: i64,
    pub requested: i64,
    pub available: i64,
}

/// A bulk item that could not be reserved. `index` is the position in the
/// caller's request list.
#[derive(Debug, PartialEq)]
pub struct ItemRejection {
    pub index: usize,
    pub error: ReservationError,
}

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error(
        "insufficient stock for variant {}: requested {}, available {}",
        .0.variant_id, .0.requested, .0.available
    )]
    InsufficientStock(StockShortfall),

    #[error("{} item(s) could not be reserved", .0.len())]
    BulkRejected(Vec<ItemRejection>),

    #[error("variant {0} not found")]
    VariantNotFound(i64),

    #[error("invalid quantity {0}")]
    InvalidQuantity(i64),

    #[error("variant {0} is already held by this checkout")]
    AlreadyHeld(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PartialEq for ReservationError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InsufficientStock(a), Self::InsufficientStock(b)) => a == b,
            (Self::BulkRejected(a), Self::BulkRejected(b)) => a == b,
            (Self::VariantNotFound(a), Self::VariantNotFound(b)) => a == b,
            (Self::InvalidQuantity(a), Self::InvalidQuantity(b)) => a == b,
            (Self::AlreadyHeld(a), Self::AlreadyHeld(b)) => a == b,
            _ => false,
        }
    }
}
