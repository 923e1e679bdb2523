//! PostgreSQL-backed store

use async_trait::async_trait;
use shared::models::{
    CheckoutAttempt, CheckoutState, Order, PaymentStatus, Product, Reservation, ReservationState,
    Variant,
};
use sqlx::PgPool;

use super::{
    CatalogStore, CheckoutStore, CommitOutcome, InventoryStore, LateSettlement, NewReservation,
    OrderStore, ReserveOutcome, StockAlert, StoreResult, WebhookEventStore,
};
use crate::db;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run pending migrations
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn product(&self, id: i64) -> StoreResult<Option<Product>> {
        Ok(db::catalog::find_product(&self.pool, id).await?)
    }

    async fn variant(&self, id: i64) -> StoreResult<Option<Variant>> {
        Ok(db::catalog::find_variant(&self.pool, id).await?)
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn available(&self, variant_id: i64, now: i64) -> StoreResult<Option<i64>> {
        Ok(db::reservations::available(&self.pool, variant_id, now).await?)
    }

    async fn try_reserve(
        &self,
        reservation: &NewReservation,
        now: i64,
    ) -> StoreResult<ReserveOutcome> {
        Ok(db::reservations::try_reserve(&self.pool, reservation, now).await?)
    }

    async fn transition_reservations(
        &self,
        ids: &[i64],
        to: ReservationState,
    ) -> StoreResult<Vec<Reservation>> {
        Ok(db::reservations::transition_ids(&self.pool, ids, to).await?)
    }

    async fn transition_checkout(
        &self,
        checkout_token: &str,
        to: ReservationState,
    ) -> StoreResult<Vec<Reservation>> {
        Ok(db::reservations::transition_token(&self.pool, checkout_token, to).await?)
    }

    async fn extend_checkout(
        &self,
        checkout_token: &str,
        now: i64,
        expires_at: i64,
    ) -> StoreResult<Vec<Reservation>> {
        Ok(db::reservations::extend_token(&self.pool, checkout_token, now, expires_at).await?)
    }

    async fn commit_checkout(&self, checkout_token: &str, now: i64) -> StoreResult<CommitOutcome> {
        Ok(db::reservations::commit_token(&self.pool, checkout_token, now).await?)
    }

    async fn settle_late(
        &self,
        reservation: &Reservation,
        now: i64,
    ) -> StoreResult<LateSettlement> {
        Ok(db::reservations::settle_late(&self.pool, reservation, now).await?)
    }

    async fn expire_due(&self, now: i64, limit: i64) -> StoreResult<Vec<Reservation>> {
        Ok(db::reservations::expire_due(&self.pool, now, limit).await?)
    }

    async fn reservations_for(&self, checkout_token: &str) -> StoreResult<Vec<Reservation>> {
        Ok(db::reservations::find_by_token(&self.pool, checkout_token).await?)
    }
}

#[async_trait]
impl CheckoutStore for PgStore {
    async fn insert_attempt(&self, attempt: &CheckoutAttempt) -> StoreResult<()> {
        Ok(db::checkouts::create(&self.pool, attempt).await?)
    }

    async fn attempt(&self, token: &str) -> StoreResult<Option<CheckoutAttempt>> {
        Ok(db::checkouts::find_by_token(&self.pool, token).await?)
    }

    async fn attempt_by_intent(
        &self,
        payment_intent_id: &str,
    ) -> StoreResult<Option<CheckoutAttempt>> {
        Ok(db::checkouts::find_by_intent(&self.pool, payment_intent_id).await?)
    }

    async fn active_attempt_for_client(
        &self,
        client_key: &str,
    ) -> StoreResult<Option<CheckoutAttempt>> {
        Ok(db::checkouts::find_active_for_client(&self.pool, client_key).await?)
    }

    async fn attach_payment_intent(
        &self,
        token: &str,
        payment_intent_id: &str,
        total: i64,
    ) -> StoreResult<()> {
        Ok(db::checkouts::attach_payment_intent(&self.pool, token, payment_intent_id, total).await?)
    }

    async fn extend_attempt(&self, token: &str, expires_at: i64) -> StoreResult<()> {
        Ok(db::checkouts::extend(&self.pool, token, expires_at).await?)
    }

    async fn transition_attempt(
        &self,
        token: &str,
        from: &[CheckoutState],
        to: CheckoutState,
    ) -> StoreResult<bool> {
        Ok(db::checkouts::transition(&self.pool, token, from, to).await?)
    }

    async fn expire_attempts(&self, now: i64) -> StoreResult<u64> {
        Ok(db::checkouts::expire_due(&self.pool, now).await?)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        Ok(db::orders::create(&self.pool, order).await?)
    }

    async fn order_by_intent(&self, payment_intent_id: &str) -> StoreResult<Option<Order>> {
        Ok(db::orders::find_by_intent(&self.pool, payment_intent_id).await?)
    }

    async fn order_by_number(&self, order_number: &str) -> StoreResult<Option<Order>> {
        Ok(db::orders::find_by_number(&self.pool, order_number).await?)
    }

    async fn transition_payment_status(
        &self,
        payment_intent_id: &str,
        next: PaymentStatus,
        now: i64,
    ) -> StoreResult<Option<Order>> {
        Ok(db::orders::transition_payment_status(&self.pool, payment_intent_id, next, now).await?)
    }

    async fn flag_oversell_risk(&self, payment_intent_id: &str, now: i64) -> StoreResult<()> {
        Ok(db::orders::flag_oversell_risk(&self.pool, payment_intent_id, now).await?)
    }

    async fn record_stock_alert(&self, alert: &StockAlert) -> StoreResult<()> {
        Ok(db::orders::insert_stock_alert(&self.pool, alert).await?)
    }
}

#[async_trait]
impl WebhookEventStore for PgStore {
    async fn claim_event(&self, event_id: &str, event_type: &str, now: i64) -> StoreResult<bool> {
        Ok(db::webhook_events::claim(&self.pool, event_id, event_type, now).await?)
    }

    async fn forget_event(&self, event_id: &str) -> StoreResult<()> {
        Ok(db::webhook_events::forget(&self.pool, event_id).await?)
    }

    async fn purge_events_before(&self, cutoff: i64) -> StoreResult<u64> {
        Ok(db::webhook_events::purge_before(&self.pool, cutoff).await?)
    }
}
