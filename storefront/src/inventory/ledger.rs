//! Stock Ledger read side
//!
//! available = physical stock - sum(active, unexpired reservations).
//! The figure returned here is informational; reservation creation re-checks
//! it inside the store's atomic reserve operation.

use std::sync::Arc;

use shared::util::now_millis;

use super::ReservationError;
use super::retry::{RetryPolicy, with_retry};
use crate::store::Store;

#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
}

impl StockLedger {
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Available units right now, never below zero
    pub async fn available_stock(&self, variant_id: i64) -> Result<i64, ReservationError> {
        self.available_stock_at(variant_id, now_millis()).await
    }

    pub async fn available_stock_at(
        &self,
        variant_id: i64,
        now: i64,
    ) -> Result<i64, ReservationError> {
        let available = with_retry(self.retry, "available_stock", || {
            self.store.available(variant_id, now)
        })
        .await?;
        available
            .map(|a| a.max(0))
            .ok_or(ReservationError::VariantNotFound(variant_id))
    }
}
