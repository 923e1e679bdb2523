//! In-memory store
//!
//! One mutex guards the whole state, so every trait method is trivially
//! atomic. Used by the test suites and for running without `DATABASE_URL`
//! in development; it is not shared across processes.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::models::{
    CheckoutAttempt, CheckoutState, Order, PaymentStatus, Product, Reservation, ReservationState,
    Variant,
};

use super::{
    CatalogStore, CheckoutStore, CommitOutcome, InventoryStore, LateSettlement, NewReservation,
    OrderStore, ReserveOutcome, StockAlert, StoreError, StoreResult, WebhookEventStore,
};

#[derive(Default)]
struct State {
    products: HashMap<i64, Product>,
    variants: HashMap<i64, Variant>,
    reservations: BTreeMap<i64, Reservation>,
    late_settlements: HashSet<i64>,
    attempts: HashMap<String, CheckoutAttempt>,
    orders: HashMap<i64, Order>,
    webhook_events: HashMap<String, i64>,
    stock_alerts: Vec<StockAlert>,
}

impl State {
    fn held(&self, variant_id: i64, now: i64, exclude_token: Option<&str>) -> i64 {
        self.reservations
            .values()
            .filter(|r| r.variant_id == variant_id && r.is_holding(now))
            .filter(|r| exclude_token != Some(r.checkout_token.as_str()))
            .map(|r| r.quantity)
            .sum()
    }

    fn available(&self, variant_id: i64, now: i64) -> Option<i64> {
        self.variants
            .get(&variant_id)
            .map(|v| v.stock - self.held(variant_id, now, None))
    }

    fn decrement_stock(&mut self, variant_id: i64, quantity: i64) {
        if let Some(v) = self.variants.get_mut(&variant_id) {
            v.stock -= quantity;
        }
    }

    fn order_by_intent_mut(&mut self, payment_intent_id: &str) -> Option<&mut Order> {
        self.orders
            .values_mut()
            .find(|o| o.payment_intent_id == payment_intent_id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_product(&self, product: Product) {
        self.state.lock().products.insert(product.id, product);
    }

    pub fn insert_variant(&self, variant: Variant) {
        self.state.lock().variants.insert(variant.id, variant);
    }

    /// Physical stock of a variant
    pub fn stock(&self, variant_id: i64) -> Option<i64> {
        self.state.lock().variants.get(&variant_id).map(|v| v.stock)
    }

    pub fn stock_alerts(&self) -> Vec<StockAlert> {
        self.state.lock().stock_alerts.clone()
    }

    /// Test helper: move a checkout's hold window (reservations and attempt)
    pub fn set_expiry(&self, checkout_token: &str, expires_at: i64) {
        let mut state = self.state.lock();
        for r in state.reservations.values_mut() {
            if r.checkout_token == checkout_token {
                r.expires_at = expires_at;
            }
        }
        if let Some(a) = state.attempts.get_mut(checkout_token) {
            a.expires_at = expires_at;
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn product(&self, id: i64) -> StoreResult<Option<Product>> {
        Ok(self.state.lock().products.get(&id).cloned())
    }

    async fn variant(&self, id: i64) -> StoreResult<Option<Variant>> {
        Ok(self.state.lock().variants.get(&id).cloned())
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn available(&self, variant_id: i64, now: i64) -> StoreResult<Option<i64>> {
        Ok(self.state.lock().available(variant_id, now))
    }

    async fn try_reserve(
        &self,
        reservation: &NewReservation,
        now: i64,
    ) -> StoreResult<ReserveOutcome> {
        let mut state = self.state.lock();
        let Some(available) = state.available(reservation.variant_id, now) else {
            return Ok(ReserveOutcome::UnknownVariant);
        };
        let duplicate = state.reservations.values().any(|r| {
            r.variant_id == reservation.variant_id
                && r.checkout_token == reservation.checkout_token
        });
        if duplicate {
            return Ok(ReserveOutcome::AlreadyHeld);
        }
        if available < reservation.quantity {
            return Ok(ReserveOutcome::Insufficient {
                available: available.max(0),
            });
        }
        let created = reservation.clone().into_reservation();
        state.reservations.insert(created.id, created.clone());
        Ok(ReserveOutcome::Reserved(created))
    }

    async fn transition_reservations(
        &self,
        ids: &[i64],
        to: ReservationState,
    ) -> StoreResult<Vec<Reservation>> {
        let mut state = self.state.lock();
        let mut moved = Vec::new();
        for id in ids {
            if let Some(r) = state.reservations.get_mut(id)
                && r.state.can_transition_to(to)
            {
                r.state = to;
                moved.push(r.clone());
            }
        }
        Ok(moved)
    }

    async fn transition_checkout(
        &self,
        checkout_token: &str,
        to: ReservationState,
    ) -> StoreResult<Vec<Reservation>> {
        let mut state = self.state.lock();
        Ok(state
            .reservations
            .values_mut()
            .filter(|r| r.checkout_token == checkout_token && r.state.can_transition_to(to))
            .map(|r| {
                r.state = to;
                r.clone()
            })
            .collect())
    }

    async fn extend_checkout(
        &self,
        checkout_token: &str,
        now: i64,
        expires_at: i64,
    ) -> StoreResult<Vec<Reservation>> {
        let mut state = self.state.lock();
        Ok(state
            .reservations
            .values_mut()
            .filter(|r| r.checkout_token == checkout_token && r.is_holding(now))
            .map(|r| {
                r.expires_at = expires_at;
                r.clone()
            })
            .collect())
    }

    async fn commit_checkout(&self, checkout_token: &str, now: i64) -> StoreResult<CommitOutcome> {
        let mut state = self.state.lock();
        let ids: Vec<i64> = state
            .reservations
            .values()
            .filter(|r| r.checkout_token == checkout_token && r.state == ReservationState::Active)
            .map(|r| r.id)
            .collect();

        let mut outcome = CommitOutcome::default();
        for id in ids {
            let Some(reservation) = state.reservations.get(&id).cloned() else {
                continue;
            };
            let covered = reservation.expires_at > now || {
                let stock = state
                    .variants
                    .get(&reservation.variant_id)
                    .map_or(0, |v| v.stock);
                stock - state.held(reservation.variant_id, now, Some(checkout_token))
                    >= reservation.quantity
            };
            let next = if covered {
                ReservationState::Committed
            } else {
                ReservationState::Expired
            };
            if let Some(r) = state.reservations.get_mut(&id) {
                r.state = next;
            }
            let updated = Reservation {
                state: next,
                ..reservation
            };
            if covered {
                state.decrement_stock(updated.variant_id, updated.quantity);
                outcome.committed.push(updated);
            } else {
                outcome.lapsed.push(updated);
            }
        }
        Ok(outcome)
    }

    async fn settle_late(
        &self,
        reservation: &Reservation,
        now: i64,
    ) -> StoreResult<LateSettlement> {
        let mut state = self.state.lock();
        if !state.late_settlements.insert(reservation.id) {
            return Ok(LateSettlement::AlreadySettled);
        }
        match state.available(reservation.variant_id, now) {
            Some(available) if available >= reservation.quantity => {
                state.decrement_stock(reservation.variant_id, reservation.quantity);
                Ok(LateSettlement::Consumed)
            }
            _ => Ok(LateSettlement::Shortfall),
        }
    }

    async fn expire_due(&self, now: i64, limit: i64) -> StoreResult<Vec<Reservation>> {
        let mut state = self.state.lock();
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state
            .reservations
            .values_mut()
            .filter(|r| r.state == ReservationState::Active && r.expires_at <= now)
            .take(limit)
            .map(|r| {
                r.state = ReservationState::Expired;
                r.clone()
            })
            .collect())
    }

    async fn reservations_for(&self, checkout_token: &str) -> StoreResult<Vec<Reservation>> {
        Ok(self
            .state
            .lock()
            .reservations
            .values()
            .filter(|r| r.checkout_token == checkout_token)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CheckoutStore for MemoryStore {
    async fn insert_attempt(&self, attempt: &CheckoutAttempt) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.attempts.contains_key(&attempt.token) {
            return Err(StoreError::Conflict(format!(
                "checkout {} already exists",
                attempt.token
            )));
        }
        state.attempts.insert(attempt.token.clone(), attempt.clone());
        Ok(())
    }

    async fn attempt(&self, token: &str) -> StoreResult<Option<CheckoutAttempt>> {
        Ok(self.state.lock().attempts.get(token).cloned())
    }

    async fn attempt_by_intent(
        &self,
        payment_intent_id: &str,
    ) -> StoreResult<Option<CheckoutAttempt>> {
        Ok(self
            .state
            .lock()
            .attempts
            .values()
            .find(|a| a.payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn active_attempt_for_client(
        &self,
        client_key: &str,
    ) -> StoreResult<Option<CheckoutAttempt>> {
        Ok(self
            .state
            .lock()
            .attempts
            .values()
            .filter(|a| {
                a.state == CheckoutState::Active && a.client_key.as_deref() == Some(client_key)
            })
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn attach_payment_intent(
        &self,
        token: &str,
        payment_intent_id: &str,
        total: i64,
    ) -> StoreResult<()> {
        if let Some(a) = self.state.lock().attempts.get_mut(token) {
            a.payment_intent_id = Some(payment_intent_id.to_string());
            a.total = Some(total);
        }
        Ok(())
    }

    async fn extend_attempt(&self, token: &str, expires_at: i64) -> StoreResult<()> {
        if let Some(a) = self.state.lock().attempts.get_mut(token) {
            a.expires_at = expires_at;
        }
        Ok(())
    }

    async fn transition_attempt(
        &self,
        token: &str,
        from: &[CheckoutState],
        to: CheckoutState,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock();
        match state.attempts.get_mut(token) {
            Some(a) if from.contains(&a.state) => {
                a.state = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_attempts(&self, now: i64) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let mut count = 0;
        for a in state.attempts.values_mut() {
            if a.state == CheckoutState::Active && a.expires_at <= now {
                a.state = CheckoutState::Expired;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut state = self.state.lock();
        let clash = state.orders.values().any(|o| {
            o.order_number == order.order_number || o.payment_intent_id == order.payment_intent_id
        });
        if clash || state.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.order_number
            )));
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn order_by_intent(&self, payment_intent_id: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .state
            .lock()
            .orders
            .values()
            .find(|o| o.payment_intent_id == payment_intent_id)
            .cloned())
    }

    async fn order_by_number(&self, order_number: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .state
            .lock()
            .orders
            .values()
            .find(|o| o.order_number == order_number)
            .cloned())
    }

    async fn transition_payment_status(
        &self,
        payment_intent_id: &str,
        next: PaymentStatus,
        now: i64,
    ) -> StoreResult<Option<Order>> {
        let mut state = self.state.lock();
        match state.order_by_intent_mut(payment_intent_id) {
            Some(o) if o.payment_status.can_transition_to(next) => {
                o.payment_status = next;
                o.updated_at = now;
                Ok(Some(o.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn flag_oversell_risk(&self, payment_intent_id: &str, now: i64) -> StoreResult<()> {
        if let Some(o) = self.state.lock().order_by_intent_mut(payment_intent_id) {
            o.oversell_risk = true;
            o.updated_at = now;
        }
        Ok(())
    }

    async fn record_stock_alert(&self, alert: &StockAlert) -> StoreResult<()> {
        self.state.lock().stock_alerts.push(alert.clone());
        Ok(())
    }
}

#[async_trait]
impl WebhookEventStore for MemoryStore {
    async fn claim_event(&self, event_id: &str, _event_type: &str, now: i64) -> StoreResult<bool> {
        let mut state = self.state.lock();
        if state.webhook_events.contains_key(event_id) {
            return Ok(false);
        }
        state.webhook_events.insert(event_id.to_string(), now);
        Ok(true)
    }

    async fn forget_event(&self, event_id: &str) -> StoreResult<()> {
        self.state.lock().webhook_events.remove(event_id);
        Ok(())
    }

    async fn purge_events_before(&self, cutoff: i64) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let before = state.webhook_events.len();
        state.webhook_events.retain(|_, at| *at >= cutoff);
        Ok((before - state.webhook_events.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(stock: i64) -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_product(Product {
            id: 1,
            name: "Poster".into(),
            base_price: 1000,
            in_stock: true,
            is_active: true,
        });
        store.insert_variant(Variant {
            id: 10,
            product_id: 1,
            name: "A2".into(),
            price_delta: 0,
            stock,
            is_available: true,
        });
        store
    }

    fn hold(id: i64, token: &str, quantity: i64, expires_at: i64) -> NewReservation {
        NewReservation {
            id,
            variant_id: 10,
            quantity,
            checkout_token: token.into(),
            created_at: 0,
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_reserve_reduces_availability() {
        let store = seeded(5);
        let outcome = store.try_reserve(&hold(1, "a", 3, 1_000), 0).await.unwrap();
        assert!(matches!(outcome, ReserveOutcome::Reserved(_)));
        assert_eq!(store.available(10, 0).await.unwrap(), Some(2));

        let outcome = store.try_reserve(&hold(2, "b", 3, 1_000), 0).await.unwrap();
        assert_eq!(outcome, ReserveOutcome::Insufficient { available: 2 });
        // expired-but-unswept holds stop counting
        assert_eq!(store.available(10, 1_000).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_unknown_variant() {
        let store = seeded(5);
        let mut new = hold(1, "a", 1, 1_000);
        new.variant_id = 99;
        assert_eq!(
            store.try_reserve(&new, 0).await.unwrap(),
            ReserveOutcome::UnknownVariant
        );
        assert_eq!(store.available(99, 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_commit_decrements_stock_once() {
        let store = seeded(5);
        store.try_reserve(&hold(1, "a", 2, 1_000), 0).await.unwrap();

        let outcome = store.commit_checkout("a", 10).await.unwrap();
        assert_eq!(outcome.committed.len(), 1);
        assert_eq!(store.stock(10), Some(3));

        let again = store.commit_checkout("a", 10).await.unwrap();
        assert!(again.committed.is_empty());
        assert_eq!(store.stock(10), Some(3));
    }

    #[tokio::test]
    async fn test_commit_past_expiry_lapses_when_stock_taken() {
        let store = seeded(2);
        store.try_reserve(&hold(1, "a", 2, 100), 0).await.unwrap();
        // hold "a" expires; "b" takes both units
        store.try_reserve(&hold(2, "b", 2, 10_000), 200).await.unwrap();

        let outcome = store.commit_checkout("a", 300).await.unwrap();
        assert!(outcome.committed.is_empty());
        assert_eq!(outcome.lapsed.len(), 1);
        assert_eq!(outcome.lapsed[0].state, ReservationState::Expired);
        assert_eq!(store.stock(10), Some(2));
    }

    #[tokio::test]
    async fn test_settle_late_is_idempotent() {
        let store = seeded(3);
        let r = match store.try_reserve(&hold(1, "a", 2, 100), 0).await.unwrap() {
            ReserveOutcome::Reserved(r) => r,
            other => panic!("unexpected {other:?}"),
        };
        store.expire_due(100, 10).await.unwrap();

        assert_eq!(store.settle_late(&r, 200).await.unwrap(), LateSettlement::Consumed);
        assert_eq!(
            store.settle_late(&r, 200).await.unwrap(),
            LateSettlement::AlreadySettled
        );
        assert_eq!(store.stock(10), Some(1));
    }

    #[tokio::test]
    async fn test_terminal_reservations_do_not_move() {
        let store = seeded(3);
        store.try_reserve(&hold(1, "a", 1, 1_000), 0).await.unwrap();
        let released = store
            .transition_checkout("a", ReservationState::Released)
            .await
            .unwrap();
        assert_eq!(released.len(), 1);

        let moved = store
            .transition_reservations(&[1], ReservationState::Committed)
            .await
            .unwrap();
        assert!(moved.is_empty());
        assert!(store.expire_due(5_000, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_event_once() {
        let store = MemoryStore::new();
        assert!(store.claim_event("evt_1", "payment_intent.succeeded", 0).await.unwrap());
        assert!(!store.claim_event("evt_1", "payment_intent.succeeded", 1).await.unwrap());
        store.forget_event("evt_1").await.unwrap();
        assert!(store.claim_event("evt_1", "payment_intent.succeeded", 2).await.unwrap());
        assert_eq!(store.purge_events_before(3).await.unwrap(), 1);
    }
}
