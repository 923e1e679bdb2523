//! Persistence seams
//!
//! Every method that changes reservation, stock or payment state is a single
//! atomic conditional operation in the backing store ("move to X only if the
//! current state allows it"). Callers never read-then-write.
//!
//! Two backends implement the traits:
//! - [`postgres::PgStore`]: production, row locks + conditional updates
//! - [`memory::MemoryStore`]: tests and local development

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use shared::models::{
    CheckoutAttempt, CheckoutState, Order, PaymentStatus, Product, Reservation, ReservationState,
    Variant,
};
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store-layer error
#[derive(Debug, Error)]
pub enum StoreError {
    /// Lock contention, serialization failure, connection hiccup. Safe to retry.
    #[error("transient store error: {0}")]
    Transient(String),
    /// Uniqueness violation
    #[error("conflict: {0}")]
    Conflict(String),
    /// Anything else (schema, decode, constraint)
    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // serialization_failure, deadlock_detected, lock_not_available, query_canceled
                Some("40001" | "40P01" | "55P03" | "57014") => Self::Transient(e.to_string()),
                Some("23505") => Self::Conflict(e.to_string()),
                _ => Self::Backend(e.to_string()),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => Self::Transient(e.to_string()),
            _ => Self::Backend(e.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Reservation to insert
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub id: i64,
    pub variant_id: i64,
    pub quantity: i64,
    pub checkout_token: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl NewReservation {
    pub fn into_reservation(self) -> Reservation {
        Reservation {
            id: self.id,
            variant_id: self.variant_id,
            quantity: self.quantity,
            checkout_token: self.checkout_token,
            created_at: self.created_at,
            expires_at: self.expires_at,
            state: ReservationState::Active,
        }
    }
}

/// Outcome of an atomic check-and-reserve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved(Reservation),
    Insufficient { available: i64 },
    UnknownVariant,
    /// The checkout already has a reservation row for this variant
    AlreadyHeld,
}

/// Outcome of committing a checkout's active reservations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Transitioned active -> committed, stock decremented
    pub committed: Vec<Reservation>,
    /// Past expiry and the units are now held by someone else: moved to expired
    pub lapsed: Vec<Reservation>,
}

/// Outcome of settling a payment that arrived after its hold ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LateSettlement {
    /// Units were still free and have been consumed
    Consumed,
    /// Units could not be consumed without driving availability negative
    Shortfall,
    /// Already settled by an earlier delivery
    AlreadySettled,
}

/// Oversell-risk record for manual follow-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAlert {
    pub kind: &'static str,
    pub payment_intent_id: String,
    pub order_number: Option<String>,
    pub variant_id: i64,
    pub quantity: i64,
    pub created_at: i64,
}

/// Catalog reads (writes belong to admin tooling)
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn product(&self, id: i64) -> StoreResult<Option<Product>>;
    async fn variant(&self, id: i64) -> StoreResult<Option<Variant>>;
}

/// Stock ledger + reservation rows
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// physical stock minus active, unexpired holds. `None` for unknown variants.
    async fn available(&self, variant_id: i64, now: i64) -> StoreResult<Option<i64>>;

    /// Re-check availability and insert an active reservation in one atomic unit,
    /// serialized per variant.
    async fn try_reserve(&self, reservation: &NewReservation, now: i64)
    -> StoreResult<ReserveOutcome>;

    /// active -> `to` for the listed reservations. Returns the rows that moved.
    async fn transition_reservations(
        &self,
        ids: &[i64],
        to: ReservationState,
    ) -> StoreResult<Vec<Reservation>>;

    /// active -> `to` for every reservation of a checkout. Returns the rows that moved.
    async fn transition_checkout(
        &self,
        checkout_token: &str,
        to: ReservationState,
    ) -> StoreResult<Vec<Reservation>>;

    /// Push the expiry of a checkout's still-holding reservations to `expires_at`.
    /// Holds already past expiry are not revived.
    async fn extend_checkout(
        &self,
        checkout_token: &str,
        now: i64,
        expires_at: i64,
    ) -> StoreResult<Vec<Reservation>>;

    /// active -> committed and decrement physical stock, atomically.
    async fn commit_checkout(&self, checkout_token: &str, now: i64) -> StoreResult<CommitOutcome>;

    /// Consume stock for a reservation that is no longer active, at most once.
    async fn settle_late(&self, reservation: &Reservation, now: i64)
    -> StoreResult<LateSettlement>;

    /// active with `expires_at <= now` -> expired, up to `limit` rows.
    async fn expire_due(&self, now: i64, limit: i64) -> StoreResult<Vec<Reservation>>;

    async fn reservations_for(&self, checkout_token: &str) -> StoreResult<Vec<Reservation>>;
}

/// Checkout attempts
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    async fn insert_attempt(&self, attempt: &CheckoutAttempt) -> StoreResult<()>;
    async fn attempt(&self, token: &str) -> StoreResult<Option<CheckoutAttempt>>;
    async fn attempt_by_intent(&self, payment_intent_id: &str)
    -> StoreResult<Option<CheckoutAttempt>>;
    async fn active_attempt_for_client(&self, client_key: &str)
    -> StoreResult<Option<CheckoutAttempt>>;
    async fn attach_payment_intent(
        &self,
        token: &str,
        payment_intent_id: &str,
        total: i64,
    ) -> StoreResult<()>;
    async fn extend_attempt(&self, token: &str, expires_at: i64) -> StoreResult<()>;
    /// Move to `to` only if the current state is one of `from`.
    async fn transition_attempt(
        &self,
        token: &str,
        from: &[CheckoutState],
        to: CheckoutState,
    ) -> StoreResult<bool>;
    /// active with `expires_at <= now` -> expired. Returns the count.
    async fn expire_attempts(&self, now: i64) -> StoreResult<u64>;
}

/// Orders
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;
    async fn order_by_intent(&self, payment_intent_id: &str) -> StoreResult<Option<Order>>;
    async fn order_by_number(&self, order_number: &str) -> StoreResult<Option<Order>>;
    /// Conditional on `PaymentStatus::allowed_sources(next)`. Returns the
    /// updated order when a transition happened.
    async fn transition_payment_status(
        &self,
        payment_intent_id: &str,
        next: PaymentStatus,
        now: i64,
    ) -> StoreResult<Option<Order>>;
    async fn flag_oversell_risk(&self, payment_intent_id: &str, now: i64) -> StoreResult<()>;
    async fn record_stock_alert(&self, alert: &StockAlert) -> StoreResult<()>;
}

/// Webhook idempotency keys
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Insert-if-absent. `true` when this call recorded the event first.
    async fn claim_event(&self, event_id: &str, event_type: &str, now: i64) -> StoreResult<bool>;
    /// Drop a claim so a redelivery can be processed again.
    async fn forget_event(&self, event_id: &str) -> StoreResult<()>;
    async fn purge_events_before(&self, cutoff: i64) -> StoreResult<u64>;
}

/// Everything the service needs from persistence
pub trait Store:
    CatalogStore + InventoryStore + CheckoutStore + OrderStore + WebhookEventStore
{
}

impl<T> Store for T where
    T: CatalogStore + InventoryStore + CheckoutStore + OrderStore + WebhookEventStore
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_row_not_found_is_backend() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(!err.is_transient());
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
