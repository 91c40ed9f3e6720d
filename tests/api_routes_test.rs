mod common;

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use common::{get, post_json, send, test_router, FakeGateway};
use drainline_checkout::services::stripe::{
    StripeAddress, StripeCheckoutSession, StripeLineItem, StripeList, StripeShipping,
};
use serde_json::{json, Value};

fn miami_address(zip: &str) -> Value {
    json!({
        "name": "Ana Ruiz",
        "email": "ana@example.com",
        "line1": "100 Biscayne Blvd",
        "line2": "",
        "city": "Miami",
        "state": "FL",
        "zip": zip,
        "country": "US",
        "postal_code": zip
    })
}

fn create_body() -> Value {
    json!({
        "priceId": "price_mini_retail",
        "quantity": 1,
        "product": "mini",
        "userEmail": "ana@example.com",
        "shippingAddress": miami_address("33101")
    })
}

#[tokio::test]
async fn health_reports_payment_configuration() {
    let router = test_router(Some(Arc::new(FakeGateway::new())));
    let (status, body) = send(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");
    assert_eq!(body["payments"], "configured");

    let router = test_router(None);
    let (_, body) = send(&router, get("/health")).await;
    assert_eq!(body["payments"], "disabled");
}

#[tokio::test]
async fn responses_carry_request_id_and_security_headers() {
    let router = test_router(None);
    let response = tower::ServiceExt::oneshot(
        router,
        Request::builder()
            .uri("/health")
            .header("x-request-id", "req-123")
            .body(axum::body::Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("x-request-id").unwrap(), "req-123");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
}

#[tokio::test]
async fn metrics_endpoint_exposes_prometheus_text() {
    let router = test_router(None);
    let _ = send(&router, get("/api/price-lookup?product=mini&quantity=2")).await;

    let response = tower::ServiceExt::oneshot(router, get("/metrics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("price_lookups_total"));
}

#[tokio::test]
async fn client_config_reports_disabled_features_with_messages() {
    let router = test_router(Some(Arc::new(FakeGateway::new())));
    let (status, body) = send(&router, get("/api/client-config")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["publishableKey"], "pk_test_123");
    assert_eq!(body["paymentsEnabled"], true);
    assert!(body.get("paymentsMessage").is_none());
    assert_eq!(body["botProtectionEnabled"], false);
    assert!(body["botProtectionMessage"].is_string());
    assert_eq!(body["currency"], "usd");
    assert_eq!(body["checkoutDebounceMs"], 500);

    let router = test_router(None);
    let (_, body) = send(&router, get("/api/client-config")).await;
    assert_eq!(body["paymentsEnabled"], false);
    assert!(body["paymentsMessage"].is_string());
}

#[tokio::test]
async fn price_lookup_returns_tier_and_checkout_link() {
    let router = test_router(None);
    let (status, body) = send(&router, get("/api/price-lookup?product=mini&quantity=12")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["priceId"], "price_mini_t10");
    assert_eq!(body["unitPrice"].as_f64(), Some(89.99));
    assert_eq!(body["quantity"], 12);
    let link = body["checkoutUrl"].as_str().unwrap();
    assert!(link.starts_with("https://shop.example.com/checkout?"));
    assert!(link.contains("priceId=price_mini_t10"));
    assert!(link.contains("quantity=12"));
}

#[tokio::test]
async fn price_lookup_rejects_bad_input() {
    let router = test_router(None);
    for uri in [
        "/api/price-lookup?product=widget&quantity=1",
        "/api/price-lookup?product=mini&quantity=abc",
        "/api/price-lookup?product=mini&quantity=0",
        "/api/price-lookup?product=mini&quantity=501",
    ] {
        let (status, body) = send(&router, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["message"].is_string(), "{}", uri);
    }
}

#[tokio::test]
async fn shipping_cost_quotes_us_and_canada() {
    let router = test_router(None);
    let (status, body) = send(
        &router,
        post_json(
            "/api/shipping-cost",
            &json!({
                "address": {"city": "Miami", "state": "FL", "postal_code": "33101", "country": "US"},
                "products": {"mini": 1}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cost"].as_f64(), Some(9.95));

    let (status, body) = send(
        &router,
        post_json(
            "/api/shipping-cost",
            &json!({
                "address": {"city": "Toronto", "state": "ON", "postal_code": "m5v 2t6", "country": "CA"},
                "products": {"mini": 1}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cost"].as_f64(), Some(18.43));
}

#[tokio::test]
async fn shipping_cost_rejects_invalid_zip() {
    let router = test_router(None);
    let (status, _) = send(
        &router,
        post_json(
            "/api/shipping-cost",
            &json!({
                "address": {"city": "Miami", "state": "FL", "postal_code": "ABCDE", "country": "US"},
                "products": {"mini": 1}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payment_endpoints_answer_503_without_a_gateway() {
    let router = test_router(None);

    let (status, _) = send(&router, post_json("/api/create-payment-intent", &create_body())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(&router, get("/api/order-details?payment_intent=pi_123")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn create_prices_the_order_server_side() {
    let gateway = Arc::new(FakeGateway::new());
    let router = test_router(Some(gateway.clone()));

    let mut request = post_json("/api/create-payment-intent", &create_body());
    request
        .headers_mut()
        .insert("Idempotency-Key", "checkout-abc".parse().unwrap());
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paymentIntentId"], "pi_fake_1");
    assert_eq!(body["clientSecret"], "pi_fake_1_secret_abc");
    assert_eq!(body["shippingCost"].as_f64(), Some(9.95));
    assert_eq!(body["taxAmount"].as_f64(), Some(7.7));
    assert_eq!(body["amount"].as_f64(), Some(117.64));
    assert_eq!(body["taxDetails"].as_array().unwrap().len(), 2);

    let intent = gateway.intent("pi_fake_1").unwrap();
    assert_eq!(intent.amount, 11764);
    assert_eq!(intent.receipt_email.as_deref(), Some("ana@example.com"));
    assert_eq!(intent.metadata["price_id"], "price_mini_retail");
    assert_eq!(intent.metadata["user_email"], "ana@example.com");
    let shipping = intent.shipping.unwrap();
    assert_eq!(shipping.address.postal_code.as_deref(), Some("33101"));
    assert_eq!(
        gateway.idempotency_keys.lock().unwrap().as_slice(),
        &[Some("checkout-abc".to_string())]
    );
}

#[tokio::test]
async fn create_rejects_mismatched_price_and_bad_idempotency_key() {
    let gateway = Arc::new(FakeGateway::new());
    let router = test_router(Some(gateway.clone()));

    let mut body = create_body();
    body["priceId"] = json!("price_sensor_retail");
    let (status, _) = send(&router, post_json("/api/create-payment-intent", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut request = post_json("/api/create-payment-intent", &create_body());
    request
        .headers_mut()
        .insert("Idempotency-Key", "k".repeat(300).parse().unwrap());
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = create_body();
    body["shippingAddress"]["email"] = json!("not-an-email");
    let (status, _) = send(&router, post_json("/api/create-payment-intent", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // sanitizing would silently turn this into ab@x.co
    body["shippingAddress"]["email"] = json!("a!b@x.co");
    let (status, payload) = send(&router, post_json("/api/create-payment-intent", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(payload["message"].as_str().unwrap().contains("Email may only contain"));

    assert!(gateway.intent("pi_fake_1").is_none());
}

#[tokio::test]
async fn update_reprices_the_existing_intent() {
    let gateway = Arc::new(FakeGateway::new());
    let router = test_router(Some(gateway.clone()));
    let (status, _) = send(&router, post_json("/api/create-payment-intent", &create_body())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &router,
        post_json(
            "/api/update-payment-intent",
            &json!({
                "paymentIntentId": "pi_fake_1",
                "priceId": "price_mini_retail",
                "quantity": 1,
                "product": "mini",
                "shippingAddress": miami_address("33102")
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paymentIntentId"], "pi_fake_1");
    let intent = gateway.intent("pi_fake_1").unwrap();
    assert_eq!(intent.amount, 11764);
    assert_eq!(
        intent.shipping.unwrap().address.postal_code.as_deref(),
        Some("33102")
    );
}

#[tokio::test]
async fn update_refuses_locked_or_malformed_intents() {
    let gateway = Arc::new(FakeGateway::new());
    let router = test_router(Some(gateway.clone()));
    send(&router, post_json("/api/create-payment-intent", &create_body())).await;
    gateway.set_status("pi_fake_1", "succeeded");

    let update = |id: &str| {
        post_json(
            "/api/update-payment-intent",
            &json!({
                "paymentIntentId": id,
                "priceId": "price_mini_retail",
                "quantity": 1,
                "product": "mini",
                "shippingAddress": miami_address("33101")
            }),
        )
    };

    let (status, _) = send(&router, update("pi_fake_1")).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&router, update("not-an-id")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, update("pi_missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_details_reads_back_intents_and_sessions() {
    let gateway = Arc::new(FakeGateway::new());
    gateway.insert_session(StripeCheckoutSession {
        id: "cs_test_1".to_string(),
        amount_total: Some(21_495),
        currency: Some("usd".to_string()),
        payment_status: "paid".to_string(),
        shipping_details: Some(StripeShipping {
            name: Some("Ana Ruiz".to_string()),
            address: StripeAddress {
                line1: Some("100 Biscayne Blvd".to_string()),
                line2: Some(String::new()),
                city: Some("Miami".to_string()),
                state: Some("FL".to_string()),
                postal_code: Some("33101".to_string()),
                country: Some("US".to_string()),
            },
        }),
        customer_details: None,
        line_items: Some(StripeList {
            data: vec![StripeLineItem {
                description: Some("DrainLine Mini".to_string()),
                quantity: Some(2),
                amount_total: 19_998,
            }],
        }),
    });
    let router = test_router(Some(gateway.clone()));
    send(&router, post_json("/api/create-payment-intent", &create_body())).await;

    let (status, body) = send(&router, get("/api/order-details?payment_intent=pi_fake_1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amountTotal"].as_f64(), Some(117.64));
    assert_eq!(body["paymentStatus"], "requires_payment_method");
    assert_eq!(body["lineItems"][0]["description"], "DrainLine Mini");
    assert_eq!(body["lineItems"][0]["amountTotal"].as_f64(), Some(99.99));

    let (status, body) = send(&router, get("/api/order-details?session_id=cs_test_1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paymentStatus"], "paid");
    assert_eq!(body["lineItems"][0]["quantity"], 2);
    assert!(body["shipping"]["line2"].is_null());

    let (status, _) = send(&router, get("/api/order-details")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, get("/api/order-details?payment_intent=pi_unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
