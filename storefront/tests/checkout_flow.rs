//! Checkout HTTP flows: init, cancel, status, payment intent, rate limiting

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

#[tokio::test]
async fn test_health() {
    let app = spawn_app(1);
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "storefront");
}

#[tokio::test]
async fn test_init_holds_stock_until_cancel() {
    let app = spawn_app(3);

    let (status, body) = app
        .post_json("/checkout/init", json!({ "items": cart(2), "customerHint": "sess-1" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = body["checkoutToken"].as_str().unwrap().to_string();
    assert_eq!(body["reservations"].as_array().unwrap().len(), 1);
    assert_eq!(body["ttlSeconds"], 900);
    assert_eq!(app.available(10).await, 1);

    let (status, body) = app.get(&format!("/checkout/{token}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "active");

    let (status, _) = app
        .post_json("/checkout/cancel", json!({ "checkoutToken": token }))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.available(10).await, 3);

    // cancelling twice is harmless
    let (status, _) = app
        .post_json("/checkout/cancel", json!({ "checkoutToken": token }))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = app.get(&format!("/checkout/{token}")).await;
    assert_eq!(body["state"], "released");
    // physical stock never moved
    assert_eq!(app.store.stock(10), Some(3));
}

#[tokio::test]
async fn test_init_rejects_invalid_cart() {
    let app = spawn_app(3);
    let (status, body) = app
        .post_json(
            "/checkout/init",
            json!({ "items": [
                { "productId": 1, "variantId": 10, "quantity": 0 },
                { "productId": 1, "variantId": 999, "quantity": 1 }
            ]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 2);
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);
    assert_eq!(app.available(10).await, 3);
}

#[tokio::test]
async fn test_malformed_bodies_are_bad_requests() {
    let app = spawn_app(3);
    let bad_quantity = json!({ "items": [{ "variantId": 10, "quantity": "two" }] });
    for (uri, body) in [
        ("/checkout/init", bad_quantity.clone()),
        ("/checkout/cancel", json!({ "token": 7 })),
        ("/payment-intent", bad_quantity),
    ] {
        let (status, body) = app.post_json(uri, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["errors"].as_array().unwrap().len(), 1, "{uri}");
    }

    let (status, body) = app
        .send(
            axum::http::Request::post("/checkout/init")
                .header("content-type", "application/json")
                .body(axum::body::Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"][0].is_string());
    assert_eq!(app.available(10).await, 3);
}

#[tokio::test]
async fn test_init_out_of_stock() {
    let app = spawn_app(1);
    let (status, body) = app
        .post_json("/checkout/init", json!({ "items": cart(2) }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Insufficient stock");
    assert!(
        body["errors"][0]
            .as_str()
            .unwrap()
            .contains("Poster / A2")
    );
    assert_eq!(app.available(10).await, 1);
}

#[tokio::test]
async fn test_unknown_checkout_is_not_found() {
    let app = spawn_app(1);
    let (status, _) = app.get("/checkout/no-such-token").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .post_json("/checkout/cancel", json!({ "checkoutToken": "no-such-token" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_intent_charges_server_price() {
    let app = spawn_app(3);

    // client-sent prices are ignored
    let mut request = payment_request(None, 1);
    request["items"][0]["price"] = json!(0.01);
    request["items"][0]["unitPrice"] = json!(1);
    request["total"] = json!(1);

    let (status, body) = app.post_json("/payment-intent", request).await;
    assert_eq!(status, StatusCode::OK);
    let expected = POSTER_PRICE + SHIPPING_FEE;
    assert_eq!(body["total"], expected);
    assert_eq!(*app.gateway.amounts.lock(), vec![expected]);
    assert_eq!(body["clientSecret"], "pi_test_1_secret");

    let (status, order) = app
        .get(&format!("/orders/{}", body["orderNumber"].as_str().unwrap()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["paymentStatus"], "pending");
    assert_eq!(order["totals"]["total"], expected);
    assert_eq!(order["items"][0]["unitPrice"], POSTER_PRICE);
}

#[tokio::test]
async fn test_payment_intent_reuses_init_hold() {
    let app = spawn_app(3);
    let (_, init) = app
        .post_json("/checkout/init", json!({ "items": cart(2), "customerHint": "sess-1" }))
        .await;
    let token = init["checkoutToken"].as_str().unwrap();

    let (status, body) = app
        .post_json("/payment-intent", payment_request(Some(token), 2))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checkoutToken"], token);
    // still a single hold of two units
    assert_eq!(app.available(10).await, 1);
}

#[tokio::test]
async fn test_shared_hint_cannot_release_paying_checkout() {
    let app = spawn_app(3);
    let (_, init) = app
        .post_json(
            "/checkout/init",
            json!({ "items": cart(1), "customerHint": "ada@example.com" }),
        )
        .await;
    let token = init["checkoutToken"].as_str().unwrap();
    let (status, _) = app
        .post_json("/payment-intent", payment_request(Some(token), 1))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post_json(
            "/checkout/init",
            json!({ "items": cart(1), "customerHint": "ada@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    assert!(app.gateway.cancelled.lock().is_empty());
    let (_, body) = app.get(&format!("/checkout/{token}")).await;
    assert_eq!(body["state"], "active");
    assert_eq!(app.available(10).await, 1);
}

#[tokio::test]
async fn test_payment_intent_rejects_bad_contact() {
    let app = spawn_app(3);
    let mut request = payment_request(None, 1);
    request["customer"]["email"] = json!("not-an-email");
    request["shipping"]["country"] = json!("Britain");

    let (status, body) = app.post_json("/payment-intent", request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);
    assert!(app.gateway.amounts.lock().is_empty());
    assert_eq!(app.available(10).await, 3);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let app = spawn_app(1);
    let (status, _) = app.get("/orders/ORD-00000000-XXXX").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_rate_limit() {
    let config = storefront::Config {
        checkout_rate_limit: 2,
        ..test_config()
    };
    let app = spawn_app_with(config, 10);
    for _ in 0..2 {
        let (status, _) = app
            .post_json("/checkout/init", json!({ "items": cart(1) }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = app
        .post_json("/checkout/init", json!({ "items": cart(1) }))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], 9);

    // other routes keep their own budget
    let (status, _) = app.get("/variants/10/availability").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_cron_requires_secret() {
    let app = spawn_app(1);
    let (status, _) = app.get("/cron/cleanup").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.cron_cleanup().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reservationsExpired"], 0);
}

#[tokio::test]
async fn test_cron_reclaims_lapsed_hold() {
    let app = spawn_app(2);
    let (_, init) = app
        .post_json("/checkout/init", json!({ "items": cart(2) }))
        .await;
    let token = init["checkoutToken"].as_str().unwrap();
    assert_eq!(app.available(10).await, 0);

    app.store.set_expiry(token, 0);
    let (status, body) = app.cron_cleanup().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reservationsExpired"], 1);
    assert_eq!(body["checkoutsExpired"], 1);
    assert_eq!(app.available(10).await, 2);

    let (_, status_body) = app.get(&format!("/checkout/{token}")).await;
    assert_eq!(status_body["state"], "expired");
}
