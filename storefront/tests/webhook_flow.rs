//! Stripe webhook flows: signature checks, idempotent commit, late payment

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use serde_json::{Value, json};
use storefront::payment::signature_header;

/// Payment intent for `quantity` posters; returns (intent id, order number, token)
async fn pay(app: &TestApp, quantity: i64) -> (String, String, String) {
    let (status, body) = app
        .post_json("/payment-intent", payment_request(None, quantity))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let intent = format!("pi_test_{}", app.gateway.amounts.lock().len());
    (
        intent,
        body["orderNumber"].as_str().unwrap().to_string(),
        body["checkoutToken"].as_str().unwrap().to_string(),
    )
}

async fn order(app: &TestApp, order_number: &str) -> Value {
    let (status, body) = app.get(&format!("/orders/{order_number}")).await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let app = spawn_app(1);
    let payload = succeeded("evt_1", "pi_test_1", 1799).to_string();
    let (status, body) = app
        .send(
            Request::post("/stripe/webhook")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1008);
}

#[tokio::test]
async fn test_bad_signature_is_rejected() {
    let app = spawn_app(3);
    let (intent, order_number, _) = pay(&app, 1).await;

    let payload = succeeded("evt_1", &intent, 1799).to_string();
    let forged = signature_header(
        payload.as_bytes(),
        "whsec_wrong",
        chrono::Utc::now().timestamp(),
    );
    let (status, body) = app
        .send(
            Request::post("/stripe/webhook")
                .header("stripe-signature", forged)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1008);
    assert_eq!(order(&app, &order_number).await["paymentStatus"], "pending");
    assert_eq!(app.store.stock(10), Some(3));
}

#[tokio::test]
async fn test_unknown_event_is_acknowledged() {
    let app = spawn_app(1);
    let (status, body) = app
        .deliver(&json!({
            "id": "evt_cust",
            "type": "customer.created",
            "data": { "object": { "id": "cus_1" } }
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
}

#[tokio::test]
async fn test_duplicate_delivery_commits_once() {
    let app = spawn_app(3);
    let (intent, order_number, token) = pay(&app, 2).await;
    assert_eq!(app.available(10).await, 1);

    let event = succeeded("evt_paid", &intent, 1799 + 1299);
    for _ in 0..2 {
        let (status, _) = app.deliver(&event).await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(app.store.stock(10), Some(1));
    assert_eq!(app.available(10).await, 1);
    let order = order(&app, &order_number).await;
    assert_eq!(order["paymentStatus"], "paid");
    assert_eq!(order["oversellRisk"], false);

    let (_, checkout) = app.get(&format!("/checkout/{token}")).await;
    assert_eq!(checkout["state"], "completed");
}

#[tokio::test]
async fn test_failed_payment_releases_hold() {
    let app = spawn_app(3);
    let (intent, order_number, _) = pay(&app, 2).await;

    let (status, _) = app
        .deliver(&json!({
            "id": "evt_fail",
            "type": "payment_intent.payment_failed",
            "data": { "object": {
                "id": intent,
                "last_payment_error": { "message": "card declined" }
            }}
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.available(10).await, 3);
    assert_eq!(app.store.stock(10), Some(3));
    assert_eq!(order(&app, &order_number).await["paymentStatus"], "failed");
}

#[tokio::test]
async fn test_refund_does_not_restock() {
    let app = spawn_app(2);
    let (intent, order_number, _) = pay(&app, 1).await;
    app.deliver(&succeeded("evt_paid", &intent, 1799)).await;
    assert_eq!(app.store.stock(10), Some(1));

    let (status, _) = app
        .deliver(&json!({
            "id": "evt_refund",
            "type": "charge.refunded",
            "data": { "object": { "id": "ch_1", "payment_intent": intent } }
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order(&app, &order_number).await["paymentStatus"], "refunded");
    assert_eq!(app.store.stock(10), Some(1));
}

#[tokio::test]
async fn test_late_payment_consumes_free_stock() {
    let app = spawn_app(1);
    let (intent, order_number, token) = pay(&app, 1).await;

    app.store.set_expiry(&token, 0);
    let (_, sweep) = app.cron_cleanup().await;
    assert_eq!(sweep["reservationsExpired"], 1);
    assert_eq!(app.available(10).await, 1);

    app.deliver(&succeeded("evt_late", &intent, 1799)).await;

    let order = order(&app, &order_number).await;
    assert_eq!(order["paymentStatus"], "paid");
    assert_eq!(order["oversellRisk"], false);
    assert_eq!(app.store.stock(10), Some(0));
    assert!(app.store.stock_alerts().is_empty());
}

#[tokio::test]
async fn test_late_payment_without_stock_flags_oversell() {
    let app = spawn_app(1);
    let (intent, order_number, token) = pay(&app, 1).await;

    app.store.set_expiry(&token, 0);
    app.cron_cleanup().await;

    // the freed unit goes to another shopper
    let (status, _) = app
        .post_json(
            "/checkout/init",
            json!({ "items": cart(1), "customerHint": "other" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(app.available(10).await, 0);

    let (status, _) = app.deliver(&succeeded("evt_late", &intent, 1799)).await;
    assert_eq!(status, StatusCode::OK);

    let order = order(&app, &order_number).await;
    assert_eq!(order["paymentStatus"], "paid");
    assert_eq!(order["oversellRisk"], true);

    // stock is never driven negative; the other shopper keeps their hold
    assert_eq!(app.store.stock(10), Some(1));
    assert_eq!(app.available(10).await, 0);

    let alerts = app.store.stock_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, "oversell_risk");
    assert_eq!(alerts[0].payment_intent_id, intent);
    assert_eq!(alerts[0].variant_id, 10);
}
