//! Shared fixtures for HTTP flow tests: in-memory store, recording gateway

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use shared::models::{Product, Variant};
use storefront::auth::InMemoryRateLimiter;
use storefront::payment::{
    CreateIntent, PaymentGateway, PaymentGatewayError, PaymentIntent, signature_header,
};
use storefront::store::MemoryStore;
use storefront::{AppState, Config, build_router};
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const CRON_SECRET: &str = "cron-test";

/// Poster base price; A2 variant has no surcharge
pub const POSTER_PRICE: i64 = 1299;
pub const SHIPPING_FEE: i64 = 500;

/// Gateway double that records charged amounts
#[derive(Default)]
pub struct FakeGateway {
    pub amounts: Mutex<Vec<i64>>,
    pub cancelled: Mutex<Vec<String>>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(
        &self,
        request: &CreateIntent<'_>,
    ) -> Result<PaymentIntent, PaymentGatewayError> {
        let mut amounts = self.amounts.lock();
        amounts.push(request.amount);
        let id = format!("pi_test_{}", amounts.len());
        Ok(PaymentIntent {
            client_secret: format!("{id}_secret"),
            id,
        })
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<(), PaymentGatewayError> {
        self.cancelled.lock().push(intent_id.to_string());
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub state: AppState,
}

pub fn test_config() -> Config {
    Config {
        stripe_webhook_secret: WEBHOOK_SECRET.into(),
        cron_secret: CRON_SECRET.into(),
        ..Config::default()
    }
}

/// Poster (variant 10, A2) with `stock` units
pub fn spawn_app(stock: i64) -> TestApp {
    spawn_app_with(test_config(), stock)
}

pub fn spawn_app_with(config: Config, stock: i64) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    store.insert_product(Product {
        id: 1,
        name: "Poster".into(),
        base_price: POSTER_PRICE,
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
    let gateway = Arc::new(FakeGateway::default());
    let state = AppState::from_parts(
        config,
        store.clone(),
        gateway.clone(),
        Arc::new(InMemoryRateLimiter::new()),
    );
    TestApp {
        router: build_router(state.clone()),
        store,
        gateway,
        state,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    /// Deliver a webhook signed with the configured secret
    pub async fn deliver(&self, event: &Value) -> (StatusCode, Value) {
        let payload = event.to_string();
        let header = signature_header(
            payload.as_bytes(),
            WEBHOOK_SECRET,
            chrono::Utc::now().timestamp(),
        );
        self.send(
            Request::post("/stripe/webhook")
                .header("stripe-signature", header)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
    }

    pub async fn cron_cleanup(&self) -> (StatusCode, Value) {
        self.send(
            Request::get("/cron/cleanup")
                .header("authorization", format!("Bearer {CRON_SECRET}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn available(&self, variant_id: i64) -> i64 {
        let (status, body) = self
            .get(&format!("/variants/{variant_id}/availability"))
            .await;
        assert_eq!(status, StatusCode::OK);
        body["available"].as_i64().unwrap()
    }
}

pub fn cart(quantity: i64) -> Value {
    json!([{ "productId": 1, "variantId": 10, "quantity": quantity }])
}

pub fn payment_request(token: Option<&str>, quantity: i64) -> Value {
    json!({
        "checkoutToken": token,
        "items": cart(quantity),
        "customer": { "email": "ada@example.com", "name": "Ada Lovelace" },
        "shipping": {
            "line1": "12 Analytical Row",
            "city": "London",
            "postalCode": "N1 9GU",
            "country": "GB"
        }
    })
}

pub fn succeeded(event_id: &str, intent_id: &str, amount: i64) -> Value {
    json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "amount_received": amount } }
    })
}
