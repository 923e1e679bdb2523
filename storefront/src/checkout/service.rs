use std::collections::BTreeMap;
use std::sync::Arc;

use shared::models::{
    CartItemInput, CheckoutAttempt, CheckoutInitRequest, CheckoutInitResponse, CheckoutState,
    CheckoutStatusResponse, Order, PaymentIntentRequest, PaymentIntentResponse, PaymentStatus,
    Reservation,
};
use shared::util::{checkout_token, now_millis, order_number, snowflake_id};

use super::CheckoutError;
use crate::catalog::CatalogService;
use crate::inventory::retry::{RetryPolicy, with_retry};
use crate::inventory::{ReservationError, ReservationManager, ReservationRequest};
use crate::payment::{CreateIntent, PaymentGateway};
use crate::pricing::{PricedCart, PricingConfig, price_cart};
use crate::store::Store;
use crate::validation::{MAX_HINT_LEN, validate_contact, validate_optional_text, validate_shipping};

/// Stock held for one checkout attempt
struct Hold {
    token: String,
    expires_at: i64,
    reservations: Vec<Reservation>,
}

pub struct CheckoutService {
    store: Arc<dyn Store>,
    catalog: Arc<CatalogService>,
    reservations: Arc<ReservationManager>,
    gateway: Arc<dyn PaymentGateway>,
    pricing: PricingConfig,
    currency: String,
    retry: RetryPolicy,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<CatalogService>,
        reservations: Arc<ReservationManager>,
        gateway: Arc<dyn PaymentGateway>,
        pricing: PricingConfig,
        currency: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            reservations,
            gateway,
            pricing,
            currency: currency.into(),
            retry,
        }
    }

    /// Validate and price a cart, then hold its stock under a new token.
    ///
    /// The caller's earlier attempt is released first, so an abandoned tab
    /// cannot lock stock against its own user. The previous checkout token
    /// identifies it outright; a bare customer hint only matches an attempt
    /// that has not reached payment yet, since hints are not secret.
    pub async fn init_checkout(
        &self,
        request: &CheckoutInitRequest,
    ) -> Result<CheckoutInitResponse, CheckoutError> {
        let mut errors = Vec::new();
        if let Err(e) = validate_optional_text(&request.customer_hint, "Customer hint", MAX_HINT_LEN)
        {
            errors.push(e);
        }
        let priced = self.price(&request.items, None, errors).await?;

        let client_key = request
            .customer_hint
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        if let Some(previous) = self
            .previous_attempt(request.previous_checkout_token.as_deref(), client_key)
            .await?
        {
            self.supersede(&previous).await?;
        }

        let hold = self.hold(&priced, client_key).await?;
        tracing::info!(
            checkout_token = %hold.token,
            lines = priced.lines.len(),
            expires_at = hold.expires_at,
            "Checkout initialized"
        );
        Ok(CheckoutInitResponse {
            checkout_token: hold.token,
            reservations: hold.reservations,
            expires_at: hold.expires_at,
            ttl_seconds: self.reservations.ttl().as_secs(),
        })
    }

    async fn previous_attempt(
        &self,
        token: Option<&str>,
        client_key: Option<&str>,
    ) -> Result<Option<CheckoutAttempt>, CheckoutError> {
        if let Some(token) = token
            && let Some(attempt) = self.store.attempt(token).await?
            && attempt.state == CheckoutState::Active
        {
            return Ok(Some(attempt));
        }
        let Some(key) = client_key else {
            return Ok(None);
        };
        Ok(self
            .store
            .active_attempt_for_client(key)
            .await?
            .filter(|a| a.payment_intent_id.is_none()))
    }

    /// Release a checkout early. Repeated calls are no-ops.
    pub async fn cancel(&self, token: &str) -> Result<(), CheckoutError> {
        let attempt = self.store.attempt(token).await?.ok_or(CheckoutError::NotFound)?;
        if attempt.state == CheckoutState::Active {
            self.supersede(&attempt).await?;
            tracing::info!(checkout_token = %token, "Checkout cancelled");
        }
        Ok(())
    }

    pub async fn status(&self, token: &str) -> Result<CheckoutStatusResponse, CheckoutError> {
        let attempt = self.store.attempt(token).await?.ok_or(CheckoutError::NotFound)?;
        let reservations = self.reservations.reservations(token).await?;
        Ok(CheckoutStatusResponse {
            checkout_token: attempt.token,
            state: attempt.state,
            expires_at: attempt.expires_at,
            reservations,
        })
    }

    /// Reprice the cart, make sure its stock is held, create the provider
    /// intent for the server-computed total and record a pending order.
    pub async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntentResponse, CheckoutError> {
        let mut errors = validate_contact(&request.customer);
        errors.extend(validate_shipping(&request.shipping));
        let priced = self
            .price(&request.items, request.discount_code.as_deref(), errors)
            .await?;
        if priced.totals.total <= 0 {
            return Err(CheckoutError::Invalid(vec![
                "Order total must be greater than zero".to_string(),
            ]));
        }

        let hold = self.hold_for_payment(request.checkout_token.as_deref(), &priced).await?;
        let token = hold.token;

        let now = now_millis();
        let number = order_number(now);
        let intent = match self
            .gateway
            .create_intent(&CreateIntent {
                amount: priced.totals.total,
                currency: &self.currency,
                idempotency_key: &token,
                order_number: &number,
                checkout_token: &token,
                receipt_email: request.customer.email.trim(),
            })
            .await
        {
            Ok(intent) => intent,
            Err(e) => {
                self.abandon(&token, None).await;
                return Err(e.into());
            }
        };

        let order = Order {
            id: snowflake_id(),
            order_number: number,
            checkout_token: token.clone(),
            payment_intent_id: intent.id.clone(),
            customer: request.customer.clone(),
            shipping_address: request.shipping.clone(),
            items: priced.order_items(),
            totals: priced.totals,
            discount_code: priced.discount_code.clone(),
            payment_status: PaymentStatus::Pending,
            oversell_risk: false,
            created_at: now,
            updated_at: now,
        };
        let attached = with_retry(self.retry, "attach_payment_intent", || {
            self.store
                .attach_payment_intent(&token, &intent.id, priced.totals.total)
        })
        .await;
        let recorded = match attached {
            Ok(()) => with_retry(self.retry, "insert_order", || self.store.insert_order(&order)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = recorded {
            self.abandon(&token, Some(&intent.id)).await;
            return Err(e.into());
        }

        tracing::info!(
            checkout_token = %token,
            order_number = %order.order_number,
            payment_intent = %intent.id,
            total = priced.totals.total,
            "Payment intent created"
        );
        Ok(PaymentIntentResponse {
            client_secret: intent.client_secret,
            order_number: order.order_number,
            checkout_token: token,
            total: priced.totals.total,
        })
    }

    /// Price a cart, appending pricing failures to `errors`. Checkout needs a
    /// concrete variant on every line because stock is tracked per variant.
    async fn price(
        &self,
        items: &[CartItemInput],
        discount_code: Option<&str>,
        mut errors: Vec<String>,
    ) -> Result<PricedCart, CheckoutError> {
        let snapshot = self.catalog.snapshot_for(items).await?;
        let priced = match price_cart(&snapshot, items, discount_code, &self.pricing) {
            Ok(priced) => Some(priced),
            Err(pricing_errors) => {
                errors.extend(pricing_errors.iter().map(ToString::to_string));
                None
            }
        };
        for (idx, item) in items.iter().enumerate() {
            if item.variant_id.is_none() {
                errors.push(format!("Item {}: select an option", idx + 1));
            }
        }
        match priced {
            Some(priced) if errors.is_empty() => Ok(priced),
            _ => Err(CheckoutError::Invalid(errors)),
        }
    }

    /// Reserve every line of a priced cart under a fresh token and record the attempt
    async fn hold(
        &self,
        priced: &PricedCart,
        client_key: Option<&str>,
    ) -> Result<Hold, CheckoutError> {
        let requests: Vec<ReservationRequest> = priced
            .lines
            .iter()
            .filter_map(|line| {
                line.variant_id.map(|variant_id| ReservationRequest {
                    variant_id,
                    quantity: line.quantity,
                })
            })
            .collect();

        let token = checkout_token();
        let reservations = match self.reservations.reserve_bulk(&requests, &token).await {
            Ok(held) => held,
            Err(ReservationError::BulkRejected(rejected)) => {
                let messages = rejected
                    .iter()
                    .map(|r| {
                        let name = priced.lines.get(r.index).map_or("item", |l| l.name.as_str());
                        match &r.error {
                            ReservationError::InsufficientStock(_) => {
                                format!("Insufficient stock for {name}")
                            }
                            _ => format!("{name} is no longer available"),
                        }
                    })
                    .collect();
                return Err(CheckoutError::OutOfStock(messages));
            }
            Err(e) => return Err(e.into()),
        };

        let now = now_millis();
        let expires_at = reservations
            .first()
            .map_or_else(|| self.reservations.expiry_from(now), |r| r.expires_at);
        let attempt = CheckoutAttempt {
            token: token.clone(),
            client_key: client_key.map(String::from),
            payment_intent_id: None,
            total: None,
            created_at: now,
            expires_at,
            state: CheckoutState::Active,
        };
        if let Err(e) = with_retry(self.retry, "insert_attempt", || {
            self.store.insert_attempt(&attempt)
        })
        .await
        {
            self.reservations.release(&token).await?;
            return Err(e.into());
        }

        Ok(Hold {
            token,
            expires_at,
            reservations,
        })
    }

    /// Reuse the hold behind `token` when it still covers exactly this cart,
    /// otherwise replace it with a fresh one.
    async fn hold_for_payment(
        &self,
        token: Option<&str>,
        priced: &PricedCart,
    ) -> Result<Hold, CheckoutError> {
        let previous = match token {
            Some(t) => self.store.attempt(t).await?,
            None => None,
        };
        let Some(previous) = previous else {
            return self.hold(priced, None).await;
        };

        if previous.state == CheckoutState::Active
            && previous.payment_intent_id.is_none()
            && previous.expires_at > now_millis()
            && let Some(hold) = self.extend_if_matching(&previous, priced).await?
        {
            return Ok(hold);
        }

        if previous.state == CheckoutState::Active {
            self.supersede(&previous).await?;
        }
        self.hold(priced, previous.client_key.as_deref()).await
    }

    async fn extend_if_matching(
        &self,
        attempt: &CheckoutAttempt,
        priced: &PricedCart,
    ) -> Result<Option<Hold>, CheckoutError> {
        let mut wanted: BTreeMap<i64, i64> = BTreeMap::new();
        for line in &priced.lines {
            if let Some(variant_id) = line.variant_id {
                *wanted.entry(variant_id).or_default() += line.quantity;
            }
        }
        let now = now_millis();
        let held: BTreeMap<i64, i64> = self
            .reservations
            .reservations(&attempt.token)
            .await?
            .into_iter()
            .filter(|r| r.is_holding(now))
            .map(|r| (r.variant_id, r.quantity))
            .collect();
        if held != wanted {
            return Ok(None);
        }

        let (expires_at, extended) = self.reservations.extend(&attempt.token).await?;
        if extended.len() != held.len() {
            // a hold lapsed in between; start over
            return Ok(None);
        }
        with_retry(self.retry, "extend_attempt", || {
            self.store.extend_attempt(&attempt.token, expires_at)
        })
        .await?;
        tracing::debug!(checkout_token = %attempt.token, expires_at, "Checkout hold extended");
        Ok(Some(Hold {
            token: attempt.token.clone(),
            expires_at,
            reservations: extended,
        }))
    }

    /// Release an active attempt's stock and retire it. Its payment intent,
    /// if any, is cancelled on a best-effort basis.
    async fn supersede(&self, attempt: &CheckoutAttempt) -> Result<(), CheckoutError> {
        self.reservations.release(&attempt.token).await?;
        with_retry(self.retry, "release_attempt", || {
            self.store.transition_attempt(
                &attempt.token,
                &[CheckoutState::Active],
                CheckoutState::Released,
            )
        })
        .await?;
        if let Some(intent_id) = &attempt.payment_intent_id {
            self.cancel_intent(intent_id).await;
        }
        tracing::info!(checkout_token = %attempt.token, "Checkout attempt released");
        Ok(())
    }

    /// Undo a half-finished payment-intent step. Failures are logged; the
    /// holds still lapse and get swept.
    async fn abandon(&self, token: &str, intent_id: Option<&str>) {
        if let Some(intent_id) = intent_id {
            self.cancel_intent(intent_id).await;
        }
        if let Err(e) = self.reservations.release(token).await {
            tracing::error!(checkout_token = %token, error = %e, "Failed to release abandoned checkout");
        }
        if let Err(e) = self
            .store
            .transition_attempt(token, &[CheckoutState::Active], CheckoutState::Released)
            .await
        {
            tracing::error!(checkout_token = %token, error = %e, "Failed to retire abandoned checkout");
        }
    }

    async fn cancel_intent(&self, intent_id: &str) {
        if let Err(e) = self.gateway.cancel_intent(intent_id).await {
            tracing::warn!(payment_intent = %intent_id, error = %e, "Failed to cancel payment intent");
        }
    }
}
