//! Payment Reconciliation Listener
//!
//! Applies signature-verified provider events to orders, checkout attempts and
//! reservations. Delivery is at-least-once: the event id is claimed first
//! (insert-if-absent) and a duplicate claim short-circuits to a no-op. Every
//! state change below is itself conditional, so a crash between steps is
//! repaired by the next delivery of the same intent's events.

use std::sync::Arc;

use shared::models::{
    CheckoutState, EventParseError, PaymentEvent, PaymentStatus, Reservation, ReservationState,
    WebhookEnvelope,
};
use shared::util::now_millis;
use thiserror::Error;

use crate::inventory::retry::{RetryPolicy, with_retry};
use crate::inventory::{ReservationError, ReservationManager};
use crate::logger::ALERT_TARGET;
use crate::store::{LateSettlement, StockAlert, Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Event id already processed
    Duplicate,
    /// Event changed order / reservation state
    Applied,
    /// Event type the storefront does not act on
    Ignored,
    /// Known event, but nothing left to change (unknown intent, order already final)
    NoOp,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Parse(#[from] EventParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Reservation(#[from] ReservationError),
}

pub struct PaymentReconciler {
    store: Arc<dyn Store>,
    reservations: Arc<ReservationManager>,
    retry: RetryPolicy,
}

impl PaymentReconciler {
    pub fn new(
        store: Arc<dyn Store>,
        reservations: Arc<ReservationManager>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            reservations,
            retry,
        }
    }

    /// Process one delivery. On failure the event claim is dropped again so
    /// a redelivery of the same event id is not mistaken for a duplicate.
    pub async fn process(
        &self,
        envelope: &WebhookEnvelope,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let event = PaymentEvent::from_envelope(envelope)?;
        if let PaymentEvent::Unknown(event_type) = &event {
            tracing::debug!(event_id = %envelope.id, event_type, "Unhandled webhook event type");
            return Ok(ReconcileOutcome::Ignored);
        }

        let now = now_millis();
        let claimed = with_retry(self.retry, "claim_event", || {
            self.store
                .claim_event(&envelope.id, &envelope.event_type, now)
        })
        .await?;
        if !claimed {
            tracing::info!(event_id = %envelope.id, "Duplicate webhook event, skipping");
            return Ok(ReconcileOutcome::Duplicate);
        }

        match self.apply(&event).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(forget_err) = self.store.forget_event(&envelope.id).await {
                    tracing::error!(
                        event_id = %envelope.id,
                        error = %forget_err,
                        "Failed to drop webhook event claim"
                    );
                }
                Err(e)
            }
        }
    }

    async fn apply(&self, event: &PaymentEvent) -> Result<ReconcileOutcome, ReconcileError> {
        match event {
            PaymentEvent::Succeeded {
                intent_id,
                amount_received,
            } => self.on_succeeded(intent_id, *amount_received).await,
            PaymentEvent::Failed { intent_id, reason } => {
                tracing::info!(
                    payment_intent = %intent_id,
                    reason = reason.as_deref().unwrap_or("unknown"),
                    "Payment failed"
                );
                self.on_ended(intent_id, PaymentStatus::Failed).await
            }
            PaymentEvent::Canceled { intent_id } => {
                self.on_ended(intent_id, PaymentStatus::Cancelled).await
            }
            PaymentEvent::Refunded { intent_id } => self.on_refunded(intent_id).await,
            PaymentEvent::Unknown(_) => Ok(ReconcileOutcome::Ignored),
        }
    }

    /// Checkout token for an intent: from the order, else from the attempt
    async fn token_for(&self, intent_id: &str) -> Result<Option<String>, ReconcileError> {
        if let Some(order) = self.store.order_by_intent(intent_id).await? {
            return Ok(Some(order.checkout_token));
        }
        Ok(self
            .store
            .attempt_by_intent(intent_id)
            .await?
            .map(|a| a.token))
    }

    async fn on_succeeded(
        &self,
        intent_id: &str,
        amount_received: Option<i64>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let order = with_retry(self.retry, "order_by_intent", || {
            self.store.order_by_intent(intent_id)
        })
        .await?;

        if let Some(order) = &order
            && !order.payment_status.can_transition_to(PaymentStatus::Paid)
        {
            if order.payment_status != PaymentStatus::Paid {
                tracing::warn!(
                    payment_intent = %intent_id,
                    order_number = %order.order_number,
                    status = order.payment_status.as_db(),
                    "Payment succeeded for an order that can no longer be paid"
                );
            }
            return Ok(ReconcileOutcome::NoOp);
        }

        let Some(token) = self.token_for(intent_id).await? else {
            tracing::warn!(payment_intent = %intent_id, "Payment succeeded for unknown intent");
            return Ok(ReconcileOutcome::NoOp);
        };

        self.reservations.commit(&token).await?;

        // Anything not committed by now ended before the payment landed
        let order_number = order.as_ref().map(|o| o.order_number.clone());
        let mut short = false;
        for reservation in self.reservations.reservations(&token).await? {
            if matches!(
                reservation.state,
                ReservationState::Released | ReservationState::Expired
            ) {
                short |= self
                    .settle_late(intent_id, order_number.as_deref(), &reservation)
                    .await?;
            }
        }

        let Some(order) = order else {
            tracing::error!(
                payment_intent = %intent_id,
                checkout_token = %token,
                "Payment succeeded without an order, stock committed"
            );
            self.complete_attempt(&token).await?;
            return Ok(ReconcileOutcome::Applied);
        };

        let now = now_millis();
        if short {
            with_retry(self.retry, "flag_oversell_risk", || {
                self.store.flag_oversell_risk(intent_id, now)
            })
            .await?;
        }
        let paid = with_retry(self.retry, "mark_paid", || {
            self.store
                .transition_payment_status(intent_id, PaymentStatus::Paid, now)
        })
        .await?;
        self.complete_attempt(&token).await?;

        if let Some(received) = amount_received
            && received != order.totals.total
        {
            tracing::warn!(
                payment_intent = %intent_id,
                order_number = %order.order_number,
                expected = order.totals.total,
                received,
                "Received amount differs from order total"
            );
        }

        match paid {
            Some(_) => {
                tracing::info!(
                    payment_intent = %intent_id,
                    order_number = %order.order_number,
                    oversell_risk = short,
                    "Order paid"
                );
                Ok(ReconcileOutcome::Applied)
            }
            None => Ok(ReconcileOutcome::NoOp),
        }
    }

    /// Consume stock for a lapsed hold. Returns `true` when the units were
    /// no longer free and the sale is now an oversell risk.
    async fn settle_late(
        &self,
        intent_id: &str,
        order_number: Option<&str>,
        reservation: &Reservation,
    ) -> Result<bool, ReconcileError> {
        match self.reservations.settle_late(reservation).await? {
            LateSettlement::AlreadySettled => Ok(false),
            LateSettlement::Consumed => {
                tracing::warn!(
                    target: ALERT_TARGET,
                    payment_intent = %intent_id,
                    checkout_token = %reservation.checkout_token,
                    variant_id = reservation.variant_id,
                    quantity = reservation.quantity,
                    "Late payment after hold ended; stock was still free and has been consumed"
                );
                Ok(false)
            }
            LateSettlement::Shortfall => {
                let alert = StockAlert {
                    kind: "oversell_risk",
                    payment_intent_id: intent_id.to_string(),
                    order_number: order_number.map(String::from),
                    variant_id: reservation.variant_id,
                    quantity: reservation.quantity,
                    created_at: now_millis(),
                };
                with_retry(self.retry, "record_stock_alert", || {
                    self.store.record_stock_alert(&alert)
                })
                .await?;
                tracing::error!(
                    target: ALERT_TARGET,
                    payment_intent = %intent_id,
                    order_number = order_number.unwrap_or("-"),
                    variant_id = reservation.variant_id,
                    quantity = reservation.quantity,
                    "Oversell risk: paid order could not be covered by free stock"
                );
                Ok(true)
            }
        }
    }

    async fn complete_attempt(&self, token: &str) -> Result<(), ReconcileError> {
        with_retry(self.retry, "complete_attempt", || {
            self.store.transition_attempt(
                token,
                &[
                    CheckoutState::Active,
                    CheckoutState::Released,
                    CheckoutState::Expired,
                ],
                CheckoutState::Completed,
            )
        })
        .await?;
        Ok(())
    }

    /// payment failed / canceled: mark the order and free the hold now
    async fn on_ended(
        &self,
        intent_id: &str,
        status: PaymentStatus,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(token) = self.token_for(intent_id).await? else {
            tracing::warn!(payment_intent = %intent_id, status = status.as_db(), "Event for unknown intent");
            return Ok(ReconcileOutcome::NoOp);
        };

        let now = now_millis();
        let updated = with_retry(self.retry, "payment_status", || {
            self.store.transition_payment_status(intent_id, status, now)
        })
        .await?;
        let released = self.reservations.release(&token).await?;
        let ended = with_retry(self.retry, "release_attempt", || {
            self.store
                .transition_attempt(&token, &[CheckoutState::Active], CheckoutState::Released)
        })
        .await?;

        tracing::info!(
            payment_intent = %intent_id,
            checkout_token = %token,
            status = status.as_db(),
            released = released.len(),
            "Payment ended without success"
        );
        if updated.is_some() || !released.is_empty() || ended {
            Ok(ReconcileOutcome::Applied)
        } else {
            Ok(ReconcileOutcome::NoOp)
        }
    }

    /// Refunds never restock automatically
    async fn on_refunded(&self, intent_id: &str) -> Result<ReconcileOutcome, ReconcileError> {
        let now = now_millis();
        let refunded = with_retry(self.retry, "refund", || {
            self.store
                .transition_payment_status(intent_id, PaymentStatus::Refunded, now)
        })
        .await?;
        match refunded {
            Some(order) => {
                tracing::info!(
                    payment_intent = %intent_id,
                    order_number = %order.order_number,
                    "Order refunded"
                );
                Ok(ReconcileOutcome::Applied)
            }
            None => Ok(ReconcileOutcome::NoOp),
        }
    }
}
