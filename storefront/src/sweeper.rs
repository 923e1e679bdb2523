//! Expiry Sweeper
//!
//! Reclaims stock from holds whose window elapsed, retires the matching
//! checkout attempts and purges old webhook idempotency keys. Runs on a
//! tokio interval and on demand from `GET /cron/cleanup`. Overlapping runs
//! are harmless: each expiry is an "only if active" update.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shared::util::now_millis;
use tokio_util::sync::CancellationToken;

use crate::catalog::CatalogService;
use crate::inventory::retry::{RetryPolicy, with_retry};
use crate::inventory::{ReservationError, ReservationManager};
use crate::store::Store;

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub reservations_expired: u64,
    pub checkouts_expired: u64,
    pub idempotency_keys_cleaned: u64,
}

pub struct ExpirySweeper {
    store: Arc<dyn Store>,
    reservations: Arc<ReservationManager>,
    catalog: Arc<CatalogService>,
    idempotency_retention: Duration,
    retry: RetryPolicy,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn Store>,
        reservations: Arc<ReservationManager>,
        catalog: Arc<CatalogService>,
        idempotency_retention: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            reservations,
            catalog,
            idempotency_retention,
            retry,
        }
    }

    pub async fn run_once(&self, now: i64) -> Result<SweepReport, ReservationError> {
        let reservations_expired = self.reservations.sweep_expired(now).await?;
        let checkouts_expired =
            with_retry(self.retry, "expire_attempts", || self.store.expire_attempts(now)).await?;

        let cutoff = now - self.idempotency_retention.as_millis() as i64;
        let idempotency_keys_cleaned = with_retry(self.retry, "purge_events", || {
            self.store.purge_events_before(cutoff)
        })
        .await?;

        self.catalog.evict_expired();

        let report = SweepReport {
            reservations_expired,
            checkouts_expired,
            idempotency_keys_cleaned,
        };
        if report != SweepReport::default() {
            tracing::info!(
                reservations = reservations_expired,
                checkouts = checkouts_expired,
                idempotency_keys = idempotency_keys_cleaned,
                "Sweep completed"
            );
        }
        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` fires
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Expiry sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(now_millis()).await {
                        tracing::error!(error = %e, "Expiry sweep failed");
                    }
                }
            }
        }
    }
}
