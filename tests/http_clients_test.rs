use std::{collections::BTreeMap, time::Duration};

use assert_matches::assert_matches;
use drainline_checkout::{
    checkout::{
        CheckoutApi, CheckoutApiError, ConfirmOutcome, HttpCheckoutApi, OrderReference,
        PaymentConfirmer, StripeConfirmer,
    },
    errors::ServiceError,
    models::{Country, ProductCode, QuoteDestination, ShippingQuoteRequest},
    services::stripe::{PaymentGateway, PaymentIntentParams, StripeClient},
};
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::{
    matchers::{basic_auth, body_string_contains, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn stripe_client(server: &MockServer) -> StripeClient {
    StripeClient::new("sk_test_123", &server.uri(), Duration::from_secs(5)).unwrap()
}

fn intent_json(id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "client_secret": format!("{}_secret_abc", id),
        "amount": 11764,
        "currency": "usd",
        "status": status,
        "metadata": {"product": "mini", "quantity": "1"}
    })
}

fn params() -> PaymentIntentParams {
    PaymentIntentParams {
        amount: 11764,
        currency: "usd".to_string(),
        receipt_email: Some("ana@example.com".to_string()),
        shipping: None,
        metadata: BTreeMap::from([("product".to_string(), "mini".to_string())]),
    }
}

#[tokio::test]
async fn stripe_create_posts_form_with_auth_and_idempotency_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(basic_auth("sk_test_123", ""))
        .and(header("Idempotency-Key", "checkout-abc"))
        .and(body_string_contains("amount=11764"))
        .and(body_string_contains("automatic_payment_methods%5Benabled%5D=true"))
        .and(body_string_contains("metadata%5Bproduct%5D=mini"))
        .respond_with(ResponseTemplate::new(200).set_body_json(intent_json("pi_1", "requires_payment_method")))
        .expect(1)
        .mount(&server)
        .await;

    let intent = stripe_client(&server)
        .create_payment_intent(&params(), Some("checkout-abc".to_string()))
        .await
        .unwrap();

    assert_eq!(intent.id, "pi_1");
    assert_eq!(intent.amount, 11764);
    assert_eq!(intent.metadata["quantity"], "1");
    assert!(!intent.is_locked());
}

#[tokio::test]
async fn stripe_update_omits_payment_method_settings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents/pi_1"))
        .and(body_string_contains("amount=11764"))
        .respond_with(ResponseTemplate::new(200).set_body_json(intent_json("pi_1", "requires_payment_method")))
        .expect(1)
        .mount(&server)
        .await;

    let intent = stripe_client(&server)
        .update_payment_intent("pi_1", &params())
        .await
        .unwrap();
    assert_eq!(intent.id, "pi_1");

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(!body.contains("automatic_payment_methods"));
}

#[tokio::test]
async fn stripe_errors_map_to_service_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"type": "invalid_request_error", "message": "No such payment_intent: 'pi_missing'"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_declined"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": {"type": "card_error", "code": "card_declined", "message": "Your card was declined."}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = stripe_client(&server);
    assert_matches!(
        client.retrieve_payment_intent("pi_missing").await,
        Err(ServiceError::NotFound(message)) if message.contains("pi_missing")
    );
    assert_matches!(
        client.retrieve_payment_intent("pi_declined").await,
        Err(ServiceError::PaymentFailed(message)) if message == "Your card was declined."
    );
    assert_matches!(
        client.retrieve_payment_intent("pi_broken").await,
        Err(ServiceError::ExternalServiceError(_))
    );
}

#[tokio::test]
async fn stripe_checkout_session_expands_line_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_test_1"))
        .and(query_param("expand[]", "line_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_1",
            "amount_total": 10994,
            "currency": "usd",
            "payment_status": "paid",
            "shipping_details": null,
            "customer_details": {"email": "ana@example.com", "name": "Ana Ruiz", "address": null},
            "line_items": {"data": [{"description": "DrainLine Mini", "quantity": 1, "amount_total": 9999}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = stripe_client(&server)
        .retrieve_checkout_session("cs_test_1")
        .await
        .unwrap();
    assert_eq!(session.payment_status, "paid");
    assert_eq!(session.line_items.unwrap().data[0].amount_total, 9999);
}

#[tokio::test]
async fn checkout_api_sends_idempotency_key_on_create() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/create-payment-intent"))
        .and(header("Idempotency-Key", "checkout-key-1"))
        .and(body_string_contains("\"priceId\":\"price_mini_retail\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "clientSecret": "pi_1_secret_abc",
            "paymentIntentId": "pi_1",
            "taxAmount": 7.7,
            "taxDetails": [],
            "shippingCost": 9.95
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpCheckoutApi::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let request = serde_json::from_value(json!({
        "priceId": "price_mini_retail",
        "quantity": 1,
        "product": "mini",
        "shippingAddress": {
            "name": "Ana Ruiz", "email": "ana@example.com", "line1": "1 Main St", "line2": "",
            "city": "Miami", "state": "FL", "zip": "33101", "country": "US", "postal_code": "33101"
        }
    }))
    .unwrap();

    let response = api
        .create_payment_intent(&request, "checkout-key-1")
        .await
        .unwrap();
    assert_eq!(response.payment_intent_id, "pi_1");
    assert_eq!(response.tax_amount, dec!(7.7));
    assert_eq!(response.shipping_cost, dec!(9.95));
}

#[tokio::test]
async fn checkout_api_surfaces_server_error_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/shipping-cost"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "Bad Request",
            "message": "Invalid postal code for US: 3310"
        })))
        .mount(&server)
        .await;

    let api = HttpCheckoutApi::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let err = api
        .shipping_quote(&ShippingQuoteRequest {
            address: QuoteDestination {
                city: "Miami".to_string(),
                state: "FL".to_string(),
                postal_code: "3310".to_string(),
                country: Country::US,
            },
            products: BTreeMap::from([(ProductCode::Mini, 1)]),
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CheckoutApiError::Status {
            status: 400,
            message: "Invalid postal code for US: 3310".to_string()
        }
    );
    assert_eq!(err.user_message(), "Invalid postal code for US: 3310");
}

#[tokio::test]
async fn checkout_api_looks_up_orders_by_reference() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/order-details"))
        .and(query_param("session_id", "cs_test_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "amountTotal": 109.94,
            "currency": "usd",
            "paymentStatus": "paid",
            "shipping": null,
            "lineItems": [{"description": "DrainLine Mini", "quantity": 1, "amountTotal": 99.99}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/price-lookup"))
        .and(query_param("product", "sensor"))
        .and(query_param("quantity", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "product": "sensor",
            "productName": "DrainLine Sensor",
            "quantity": 10,
            "priceId": "price_sensor_t10",
            "unitPrice": 44.99,
            "checkoutUrl": "https://shop.example.com/checkout?product=sensor"
        })))
        .mount(&server)
        .await;

    let api = HttpCheckoutApi::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let summary = api
        .order_details(&OrderReference::CheckoutSession("cs_test_1".to_string()))
        .await
        .unwrap();
    assert_eq!(summary.amount_total, dec!(109.94));
    assert_eq!(summary.line_items.len(), 1);

    let quote = api.price_lookup(ProductCode::Sensor, 10).await.unwrap();
    assert_eq!(quote.price_id, "price_sensor_t10");
    assert_eq!(quote.unit_price, dec!(44.99));
}

#[tokio::test]
async fn confirmer_reports_success_redirect_and_decline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents/pi_ok/confirm"))
        .and(header("authorization", "Bearer pk_test_123"))
        .and(body_string_contains("payment_method=pm_card_visa"))
        .respond_with(ResponseTemplate::new(200).set_body_json(intent_json("pi_ok", "succeeded")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents/pi_3ds/confirm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_3ds",
            "amount": 11764,
            "currency": "usd",
            "status": "requires_action",
            "next_action": {"type": "redirect_to_url", "redirect_to_url": {"url": "https://hooks.stripe.com/3ds"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents/pi_declined/confirm"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": {"type": "card_error", "message": "Your card has insufficient funds."}
        })))
        .mount(&server)
        .await;

    let confirmer = StripeConfirmer::new(
        "pk_test_123",
        "pm_card_visa",
        &server.uri(),
        Duration::from_secs(5),
    )
    .unwrap();
    let return_url = "https://shop.example.com/order-confirmation";

    assert_eq!(
        confirmer.confirm("pi_ok_secret_abc", return_url).await,
        ConfirmOutcome::Succeeded {
            payment_intent_id: "pi_ok".to_string()
        }
    );
    assert_eq!(
        confirmer.confirm("pi_3ds_secret_abc", return_url).await,
        ConfirmOutcome::RequiresAction {
            redirect_url: "https://hooks.stripe.com/3ds".to_string()
        }
    );
    assert_eq!(
        confirmer.confirm("pi_declined_secret_abc", return_url).await,
        ConfirmOutcome::Failed {
            message: "Your card has insufficient funds.".to_string()
        }
    );
    assert_matches!(
        confirmer.confirm("garbage", return_url).await,
        ConfirmOutcome::Failed { .. }
    );
}
