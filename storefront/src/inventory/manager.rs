//! Reservation Manager
//!
//! ```text
//! reserve / reserve_bulk ──► active ──► commit   (payment succeeded, stock consumed)
//!                              │
//!                              ├──────► release  (cancel, supersede, payment failed)
//!                              │
//!                              └──────► sweep    (TTL elapsed)
//! ```
//!
//! Every transition is a conditional "only if active" update in the store, so
//! the sweeper and the payment listener can race freely: whichever observes
//! `active` first wins and the other becomes a no-op.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use shared::models::{Reservation, ReservationState};
use shared::util::{now_millis, snowflake_id};

use super::retry::{RetryPolicy, with_retry};
use super::{ItemRejection, ReservationError, StockShortfall};
use crate::catalog::{CacheTag, CatalogService};
use crate::store::{CommitOutcome, LateSettlement, NewReservation, ReserveOutcome, Store};

/// Rows expired per sweep batch
const SWEEP_BATCH: i64 = 500;

/// One line of a bulk reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationRequest {
    pub variant_id: i64,
    pub quantity: i64,
}

pub struct ReservationManager {
    store: Arc<dyn Store>,
    catalog: Arc<CatalogService>,
    ttl: Duration,
    retry: RetryPolicy,
}

impl ReservationManager {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<CatalogService>,
        ttl: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            ttl,
            retry,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Expiry for a hold created at `now`
    pub fn expiry_from(&self, now: i64) -> i64 {
        now + self.ttl.as_millis() as i64
    }

    /// Reserve `quantity` units of one variant for a checkout
    pub async fn reserve(
        &self,
        variant_id: i64,
        quantity: i64,
        checkout_token: &str,
    ) -> Result<Reservation, ReservationError> {
        let now = now_millis();
        self.reserve_until(variant_id, quantity, checkout_token, now, self.expiry_from(now))
            .await
    }

    async fn reserve_until(
        &self,
        variant_id: i64,
        quantity: i64,
        checkout_token: &str,
        now: i64,
        expires_at: i64,
    ) -> Result<Reservation, ReservationError> {
        if quantity <= 0 {
            return Err(ReservationError::InvalidQuantity(quantity));
        }
        let new = NewReservation {
            id: snowflake_id(),
            variant_id,
            quantity,
            checkout_token: checkout_token.to_string(),
            created_at: now,
            expires_at,
        };
        let outcome = with_retry(self.retry, "reserve", || self.store.try_reserve(&new, now)).await?;
        match outcome {
            ReserveOutcome::Reserved(reservation) => {
                tracing::debug!(
                    reservation_id = reservation.id,
                    variant_id,
                    quantity,
                    checkout_token,
                    "Stock reserved"
                );
                Ok(reservation)
            }
            ReserveOutcome::Insufficient { available } => {
                Err(ReservationError::InsufficientStock(StockShortfall {
                    variant_id,
                    requested: quantity,
                    available,
                }))
            }
            ReserveOutcome::UnknownVariant => Err(ReservationError::VariantNotFound(variant_id)),
            ReserveOutcome::AlreadyHeld => Err(ReservationError::AlreadyHeld(variant_id)),
        }
    }

    /// All-or-nothing reservation of several lines under one token.
    ///
    /// Lines for the same variant are merged. Each per-variant reservation is
    /// atomic on its own; if any line fails, the lines already reserved are
    /// released before returning, and the remaining lines are only checked
    /// (not reserved) so every failing line is reported.
    pub async fn reserve_bulk(
        &self,
        items: &[ReservationRequest],
        checkout_token: &str,
    ) -> Result<Vec<Reservation>, ReservationError> {
        let now = now_millis();
        let expires_at = self.expiry_from(now);

        // variant -> (first index, total quantity)
        let mut merged: BTreeMap<i64, (usize, i64)> = BTreeMap::new();
        for (index, item) in items.iter().enumerate() {
            let entry = merged.entry(item.variant_id).or_insert((index, 0));
            entry.1 += item.quantity;
        }
        let mut lines: Vec<(usize, ReservationRequest)> = merged
            .into_iter()
            .map(|(variant_id, (index, quantity))| {
                (
                    index,
                    ReservationRequest {
                        variant_id,
                        quantity,
                    },
                )
            })
            .collect();
        lines.sort_by_key(|(index, _)| *index);

        let mut reserved = Vec::with_capacity(lines.len());
        let mut rejected = Vec::new();
        for (index, line) in lines {
            if !rejected.is_empty() {
                if let Some(error) = self.check_only(line, now).await? {
                    rejected.push(ItemRejection { index, error });
                }
                continue;
            }
            match self
                .reserve_until(line.variant_id, line.quantity, checkout_token, now, expires_at)
                .await
            {
                Ok(r) => reserved.push(r),
                Err(ReservationError::Store(e)) => {
                    self.compensate(&reserved, checkout_token).await;
                    return Err(ReservationError::Store(e));
                }
                Err(error) => rejected.push(ItemRejection { index, error }),
            }
        }

        if rejected.is_empty() {
            return Ok(reserved);
        }
        self.compensate(&reserved, checkout_token).await;
        tracing::info!(
            checkout_token,
            rejected = rejected.len(),
            "Bulk reservation rejected"
        );
        Err(ReservationError::BulkRejected(rejected))
    }

    /// Availability check without reserving, for reporting
    async fn check_only(
        &self,
        line: ReservationRequest,
        now: i64,
    ) -> Result<Option<ReservationError>, ReservationError> {
        if line.quantity <= 0 {
            return Ok(Some(ReservationError::InvalidQuantity(line.quantity)));
        }
        let available = with_retry(self.retry, "available", || {
            self.store.available(line.variant_id, now)
        })
        .await?;
        Ok(match available {
            None => Some(ReservationError::VariantNotFound(line.variant_id)),
            Some(a) if a < line.quantity => {
                Some(ReservationError::InsufficientStock(StockShortfall {
                    variant_id: line.variant_id,
                    requested: line.quantity,
                    available: a.max(0),
                }))
            }
            Some(_) => None,
        })
    }

    /// Release the partial reservations of a failed bulk request
    async fn compensate(&self, reserved: &[Reservation], checkout_token: &str) {
        if reserved.is_empty() {
            return;
        }
        let ids: Vec<i64> = reserved.iter().map(|r| r.id).collect();
        if let Err(e) = self.release_ids(&ids).await {
            // The holds still lapse at their expiry and get swept
            tracing::error!(checkout_token, error = %e, "Failed to roll back partial reservation");
        }
    }

    pub async fn release_ids(&self, ids: &[i64]) -> Result<Vec<Reservation>, ReservationError> {
        Ok(with_retry(self.retry, "release_ids", || {
            self.store
                .transition_reservations(ids, ReservationState::Released)
        })
        .await?)
    }

    /// Release every active reservation of a checkout. Idempotent.
    pub async fn release(&self, checkout_token: &str) -> Result<Vec<Reservation>, ReservationError> {
        let released = with_retry(self.retry, "release", || {
            self.store
                .transition_checkout(checkout_token, ReservationState::Released)
        })
        .await?;
        if !released.is_empty() {
            tracing::info!(checkout_token, count = released.len(), "Reservations released");
        }
        Ok(released)
    }

    /// Restart the hold window of a checkout's live reservations.
    /// Returns the new expiry and the reservations that were extended.
    pub async fn extend(
        &self,
        checkout_token: &str,
    ) -> Result<(i64, Vec<Reservation>), ReservationError> {
        let now = now_millis();
        let expires_at = self.expiry_from(now);
        let extended = with_retry(self.retry, "extend", || {
            self.store.extend_checkout(checkout_token, now, expires_at)
        })
        .await?;
        Ok((expires_at, extended))
    }

    /// Commit every active reservation of a checkout, consuming physical stock
    pub async fn commit(&self, checkout_token: &str) -> Result<CommitOutcome, ReservationError> {
        let now = now_millis();
        let outcome = with_retry(self.retry, "commit", || {
            self.store.commit_checkout(checkout_token, now)
        })
        .await?;
        for r in &outcome.committed {
            self.catalog.invalidate(CacheTag::Variant(r.variant_id));
        }
        if !outcome.committed.is_empty() {
            tracing::info!(
                checkout_token,
                committed = outcome.committed.len(),
                lapsed = outcome.lapsed.len(),
                "Reservations committed"
            );
        }
        Ok(outcome)
    }

    /// Consume stock for a reservation that ended before its payment landed
    pub async fn settle_late(
        &self,
        reservation: &Reservation,
    ) -> Result<LateSettlement, ReservationError> {
        let now = now_millis();
        let settlement = with_retry(self.retry, "settle_late", || {
            self.store.settle_late(reservation, now)
        })
        .await?;
        if settlement == LateSettlement::Consumed {
            self.catalog.invalidate(CacheTag::Variant(reservation.variant_id));
        }
        Ok(settlement)
    }

    /// Expire every active reservation whose window has elapsed. Returns the count.
    pub async fn sweep_expired(&self, now: i64) -> Result<u64, ReservationError> {
        let mut total = 0u64;
        loop {
            let batch = with_retry(self.retry, "sweep_expired", || {
                self.store.expire_due(now, SWEEP_BATCH)
            })
            .await?;
            total += batch.len() as u64;
            if (batch.len() as i64) < SWEEP_BATCH {
                break;
            }
        }
        if total > 0 {
            tracing::info!(expired = total, "Expired reservations swept");
        }
        Ok(total)
    }

    pub async fn reservations(&self, checkout_token: &str) -> Result<Vec<Reservation>, ReservationError> {
        Ok(with_retry(self.retry, "reservations", || {
            self.store.reservations_for(checkout_token)
        })
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::StockLedger;
    use crate::store::MemoryStore;
    use shared::models::{Product, Variant};

    fn store_with(variants: &[(i64, i64)]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert_product(Product {
            id: 1,
            name: "Poster".into(),
            base_price: 1000,
            in_stock: true,
            is_active: true,
        });
        for &(id, stock) in variants {
            store.insert_variant(Variant {
                id,
                product_id: 1,
                name: format!("V{id}"),
                price_delta: 0,
                stock,
                is_available: true,
            });
        }
        store
    }

    fn manager(store: Arc<MemoryStore>, ttl: Duration) -> (ReservationManager, StockLedger) {
        let catalog = Arc::new(CatalogService::new(store.clone(), Duration::from_secs(60)));
        (
            ReservationManager::new(store.clone(), catalog, ttl, RetryPolicy::default()),
            StockLedger::new(store, RetryPolicy::default()),
        )
    }

    fn req(variant_id: i64, quantity: i64) -> ReservationRequest {
        ReservationRequest {
            variant_id,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_reserve_holds_without_consuming() {
        let store = store_with(&[(10, 5)]);
        let (mgr, ledger) = manager(store.clone(), Duration::from_secs(900));

        let r = mgr.reserve(10, 2, "tok").await.unwrap();
        assert_eq!(r.state, ReservationState::Active);
        assert_eq!(ledger.available_stock(10).await.unwrap(), 3);
        assert_eq!(store.stock(10), Some(5));

        mgr.commit("tok").await.unwrap();
        assert_eq!(store.stock(10), Some(3));
        assert_eq!(ledger.available_stock(10).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_second_hold_for_same_variant_is_typed() {
        let store = store_with(&[(10, 5)]);
        let (mgr, ledger) = manager(store, Duration::from_secs(900));

        mgr.reserve(10, 2, "tok").await.unwrap();
        let err = mgr.reserve(10, 1, "tok").await.unwrap_err();
        assert_eq!(err, ReservationError::AlreadyHeld(10));
        assert_eq!(ledger.available_stock(10).await.unwrap(), 3);

        // a different checkout is unaffected
        mgr.reserve(10, 1, "other").await.unwrap();
        assert_eq!(ledger.available_stock(10).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_stock_is_not_partial() {
        let store = store_with(&[(10, 2)]);
        let (mgr, ledger) = manager(store, Duration::from_secs(900));

        let err = mgr.reserve(10, 3, "tok").await.unwrap_err();
        assert_eq!(
            err,
            ReservationError::InsufficientStock(StockShortfall {
                variant_id: 10,
                requested: 3,
                available: 2
            })
        );
        assert_eq!(ledger.available_stock(10).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_bulk_rolls_back_on_any_failure() {
        let store = store_with(&[(10, 5), (11, 1), (12, 0)]);
        let (mgr, ledger) = manager(store, Duration::from_secs(900));

        let err = mgr
            .reserve_bulk(&[req(10, 2), req(11, 2), req(12, 1), req(99, 1)], "tok")
            .await
            .unwrap_err();
        let ReservationError::BulkRejected(rejected) = err else {
            panic!("expected bulk rejection");
        };
        let indexes: Vec<usize> = rejected.iter().map(|r| r.index).collect();
        assert_eq!(indexes, vec![1, 2, 3]);
        assert_eq!(rejected[2].error, ReservationError::VariantNotFound(99));

        // nothing stays held
        assert_eq!(ledger.available_stock(10).await.unwrap(), 5);
        assert_eq!(ledger.available_stock(11).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bulk_merges_duplicate_variants() {
        let store = store_with(&[(10, 3)]);
        let (mgr, ledger) = manager(store, Duration::from_secs(900));

        let held = mgr.reserve_bulk(&[req(10, 1), req(10, 2)], "tok").await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].quantity, 3);
        assert_eq!(ledger.available_stock(10).await.unwrap(), 0);

        let err = mgr.reserve_bulk(&[req(10, 2), req(10, 2)], "other").await;
        assert!(matches!(err, Err(ReservationError::BulkRejected(_))));
    }

    #[tokio::test]
    async fn test_bulk_shares_one_expiry() {
        let store = store_with(&[(10, 3), (11, 3)]);
        let (mgr, _) = manager(store, Duration::from_secs(900));
        let held = mgr.reserve_bulk(&[req(10, 1), req(11, 1)], "tok").await.unwrap();
        assert_eq!(held[0].expires_at, held[1].expires_at);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let store = store_with(&[(10, 4)]);
        let (mgr, ledger) = manager(store, Duration::from_secs(900));
        mgr.reserve(10, 4, "tok").await.unwrap();

        assert_eq!(mgr.release("tok").await.unwrap().len(), 1);
        let after_first = mgr.reservations("tok").await.unwrap();
        assert!(mgr.release("tok").await.unwrap().is_empty());
        assert_eq!(mgr.reservations("tok").await.unwrap(), after_first);
        assert_eq!(ledger.available_stock(10).await.unwrap(), 4);

        // a released set cannot be committed afterwards
        assert!(mgr.commit("tok").await.unwrap().committed.is_empty());
    }

    #[tokio::test]
    async fn test_ttl_hold_returns_after_sweep() {
        let store = store_with(&[(10, 5)]);
        let (mgr, ledger) = manager(store, Duration::from_millis(100));

        let before = ledger.available_stock(10).await.unwrap();
        mgr.reserve(10, 2, "tok").await.unwrap();
        assert_eq!(ledger.available_stock(10).await.unwrap(), before - 2);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(mgr.sweep_expired(now_millis()).await.unwrap(), 1);
        assert_eq!(ledger.available_stock(10).await.unwrap(), before);

        // second sweep is a no-op
        assert_eq!(mgr.sweep_expired(now_millis()).await.unwrap(), 0);
        let rs = mgr.reservations("tok").await.unwrap();
        assert_eq!(rs[0].state, ReservationState::Expired);
    }

    #[tokio::test]
    async fn test_sweep_skips_committed_and_released() {
        let store = store_with(&[(10, 5)]);
        let (mgr, _) = manager(store, Duration::from_millis(50));
        mgr.reserve(10, 1, "paid").await.unwrap();
        mgr.reserve(10, 1, "gone").await.unwrap();
        mgr.commit("paid").await.unwrap();
        mgr.release("gone").await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(mgr.sweep_expired(now_millis()).await.unwrap(), 0);
        assert_eq!(
            mgr.reservations("paid").await.unwrap()[0].state,
            ReservationState::Committed
        );
    }

    #[tokio::test]
    async fn test_extend_keeps_hold_alive() {
        let store = store_with(&[(10, 5)]);
        let (mgr, _) = manager(store, Duration::from_millis(200));
        let r = mgr.reserve(10, 1, "tok").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (expires_at, extended) = mgr.extend("tok").await.unwrap();
        assert_eq!(extended.len(), 1);
        assert!(expires_at > r.expires_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_unit_goes_to_exactly_one_caller() {
        let store = store_with(&[(10, 1)]);
        let (mgr, _) = manager(store, Duration::from_secs(900));
        let mgr = Arc::new(mgr);

        let a = tokio::spawn({
            let mgr = mgr.clone();
            async move { mgr.reserve(10, 1, "a").await }
        });
        let b = tokio::spawn({
            let mgr = mgr.clone();
            async move { mgr.reserve(10, 1, "b").await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let short = results
            .iter()
            .filter(|r| matches!(r, Err(ReservationError::InsufficientStock(_))))
            .count();
        assert_eq!((ok, short), (1, 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_reserves_never_exceed_stock() {
        const STOCK: i64 = 7;
        let store = store_with(&[(10, STOCK)]);
        let (mgr, ledger) = manager(store.clone(), Duration::from_secs(900));
        let mgr = Arc::new(mgr);

        let tasks: Vec<_> = (0..40)
            .map(|i| {
                let mgr = mgr.clone();
                tokio::spawn(async move { mgr.reserve(10, 1 + (i % 3), &format!("tok-{i}")).await })
            })
            .collect();
        let mut held = 0;
        for t in tasks {
            if let Ok(r) = t.await.unwrap() {
                held += r.quantity;
            }
        }
        assert!(held <= STOCK);
        assert_eq!(ledger.available_stock(10).await.unwrap(), STOCK - held);

        // committing everything still never exceeds physical stock
        for i in 0..40 {
            mgr.commit(&format!("tok-{i}")).await.unwrap();
        }
        assert_eq!(store.stock(10), Some(STOCK - held));
        assert!(store.stock(10).unwrap() >= 0);
    }
}
