#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use drainline_checkout::{
    build_router,
    checkout::{
        CheckoutApi, CheckoutApiError, CheckoutFlow, CheckoutOptions, CheckoutView, Identity,
        OrderReference,
    },
    config::AppConfig,
    errors::ServiceError,
    models::{
        AddressField, CreatePaymentIntentRequest, OrderSummary, PaymentIntentResponse,
        ShippingQuoteRequest, ShippingQuoteResponse, UpdatePaymentIntentRequest,
    },
    services::{
        stripe::{
            PaymentGateway, PaymentIntentParams, StripeCheckoutSession, StripePaymentIntent,
        },
        tax::TaxService,
    },
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tokio::sync::watch;
use tower::ServiceExt;

/// Checkout link for one DrainLine Mini at the retail tier.
pub const MINI_QUERY: &str =
    "product=mini&productName=DrainLine%20Mini&quantity=1&priceId=price_abc123&unitPrice=99.99";

/// Recorded traffic and canned behavior for [`FakeCheckoutApi`].
#[derive(Default)]
struct FakeState {
    quotes: Vec<ShippingQuoteRequest>,
    creates: Vec<(CreatePaymentIntentRequest, String)>,
    updates: Vec<UpdatePaymentIntentRequest>,
    shipping_by_zip: HashMap<String, Decimal>,
    update_delays: VecDeque<Duration>,
    fail_quotes: bool,
    fail_creates: bool,
}

/// In-process checkout server: answers like the real endpoints and counts calls.
#[derive(Clone)]
pub struct FakeCheckoutApi {
    state: Arc<Mutex<FakeState>>,
    default_shipping: Decimal,
    tax: Arc<TaxService>,
    pub quote_delay: Duration,
    pub create_delay: Duration,
}

impl Default for FakeCheckoutApi {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            default_shipping: dec!(15.00),
            tax: Arc::new(TaxService::default()),
            quote_delay: Duration::from_millis(50),
            create_delay: Duration::from_millis(100),
        }
    }
}

impl FakeCheckoutApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn shipping_for_zip(&self, zip: &str, cost: Decimal) {
        self.lock().shipping_by_zip.insert(zip.to_string(), cost);
    }

    /// Delays applied to the next update calls, in call order.
    pub fn queue_update_delays(&self, delays: impl IntoIterator<Item = Duration>) {
        self.lock().update_delays.extend(delays);
    }

    pub fn fail_quotes(&self, fail: bool) {
        self.lock().fail_quotes = fail;
    }

    pub fn fail_creates(&self, fail: bool) {
        self.lock().fail_creates = fail;
    }

    pub fn quote_count(&self) -> usize {
        self.lock().quotes.len()
    }

    pub fn creates(&self) -> Vec<(CreatePaymentIntentRequest, String)> {
        self.lock().creates.clone()
    }

    pub fn updates(&self) -> Vec<UpdatePaymentIntentRequest> {
        self.lock().updates.clone()
    }

    /// Create and update calls together
    pub fn reconcile_count(&self) -> usize {
        let state = self.lock();
        state.creates.len() + state.updates.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn shipping_cost(&self, zip: &str) -> Decimal {
        self.lock()
            .shipping_by_zip
            .get(zip)
            .copied()
            .unwrap_or(self.default_shipping)
    }

    fn respond(
        &self,
        payment_intent_id: &str,
        state_code: &str,
        zip: &str,
        country: drainline_checkout::models::Country,
        subtotal: Decimal,
    ) -> PaymentIntentResponse {
        let shipping_cost = self.shipping_cost(zip);
        let tax = self
            .tax
            .calculate_tax(subtotal, shipping_cost, state_code, country)
            .unwrap();
        PaymentIntentResponse {
            client_secret: format!("{}_secret_test", payment_intent_id),
            payment_intent_id: payment_intent_id.to_string(),
            tax_amount: tax.tax_amount,
            tax_details: tax.details,
            shipping_cost,
            amount: Some(subtotal + shipping_cost + tax.tax_amount),
        }
    }
}

fn unit_price(price_id: &str) -> Decimal {
    match price_id {
        "price_sensor_retail" => dec!(49.99),
        _ => dec!(99.99),
    }
}

#[async_trait]
impl CheckoutApi for FakeCheckoutApi {
    async fn shipping_quote(
        &self,
        request: &ShippingQuoteRequest,
    ) -> Result<ShippingQuoteResponse, CheckoutApiError> {
        let fail = {
            let mut state = self.lock();
            state.quotes.push(request.clone());
            state.fail_quotes
        };
        tokio::time::sleep(self.quote_delay).await;
        if fail {
            return Err(CheckoutApiError::Status {
                status: 400,
                message: "Invalid ZIP code".to_string(),
            });
        }
        Ok(ShippingQuoteResponse {
            cost: self.shipping_cost(&request.address.postal_code),
        })
    }

    async fn create_payment_intent(
        &self,
        request: &CreatePaymentIntentRequest,
        idempotency_key: &str,
    ) -> Result<PaymentIntentResponse, CheckoutApiError> {
        let fail = {
            let mut state = self.lock();
            state
                .creates
                .push((request.clone(), idempotency_key.to_string()));
            state.fail_creates
        };
        tokio::time::sleep(self.create_delay).await;
        if fail {
            return Err(CheckoutApiError::Status {
                status: 502,
                message: "Payment service unavailable".to_string(),
            });
        }
        let address = &request.shipping_address.address;
        Ok(self.respond(
            "pi_test_1",
            &address.state,
            &address.zip,
            address.country,
            unit_price(&request.price_id) * Decimal::from(request.quantity),
        ))
    }

    async fn update_payment_intent(
        &self,
        request: &UpdatePaymentIntentRequest,
    ) -> Result<PaymentIntentResponse, CheckoutApiError> {
        let delay = {
            let mut state = self.lock();
            state.updates.push(request.clone());
            state
                .update_delays
                .pop_front()
                .unwrap_or(Duration::from_millis(100))
        };
        tokio::time::sleep(delay).await;
        let address = &request.shipping_address.address;
        Ok(self.respond(
            &request.payment_intent_id,
            &address.state,
            &address.zip,
            address.country,
            unit_price(&request.price_id) * Decimal::from(request.quantity),
        ))
    }

    async fn order_details(
        &self,
        reference: &OrderReference,
    ) -> Result<OrderSummary, CheckoutApiError> {
        Err(CheckoutApiError::Status {
            status: 404,
            message: format!("No order {}", reference.id()),
        })
    }
}

/// Starts a session on [`MINI_QUERY`] with the default 500ms quiet period.
pub fn start_mini_checkout(api: &FakeCheckoutApi) -> CheckoutFlow {
    CheckoutFlow::start(
        MINI_QUERY,
        Identity::anonymous(),
        Arc::new(api.clone()),
        CheckoutOptions {
            idempotency_key: Some("checkout-test-key".to_string()),
            ..CheckoutOptions::default()
        },
    )
    .unwrap()
}

/// Types a complete Miami, FL address one field at a time.
pub fn fill_miami_address(flow: &CheckoutFlow, email: &str) {
    flow.set_field(AddressField::Name, "Ana Ruiz");
    flow.set_field(AddressField::Email, email);
    flow.set_field(AddressField::Line1, "100 Biscayne Blvd");
    flow.set_field(AddressField::City, "Miami");
    flow.set_field(AddressField::State, "FL");
    flow.set_field(AddressField::Zip, "33101");
}

/// Lets every pending timer and fake call run to completion on the paused clock.
pub async fn settle() {
    tokio::time::sleep(Duration::from_secs(5)).await;
}

pub async fn wait_for_view(
    updates: &mut watch::Receiver<CheckoutView>,
    predicate: impl FnMut(&CheckoutView) -> bool,
) -> CheckoutView {
    tokio::time::timeout(Duration::from_secs(30), updates.wait_for(predicate))
        .await
        .expect("checkout view never reached the expected state")
        .expect("checkout session ended")
        .clone()
}

/// Payment platform double keyed by intent id.
#[derive(Default)]
pub struct FakeGateway {
    intents: Mutex<BTreeMap<String, StripePaymentIntent>>,
    sessions: Mutex<BTreeMap<String, StripeCheckoutSession>>,
    pub idempotency_keys: Mutex<Vec<Option<String>>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_intent(&self, intent: StripePaymentIntent) {
        self.intents.lock().unwrap().insert(intent.id.clone(), intent);
    }

    pub fn insert_session(&self, session: StripeCheckoutSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    pub fn intent(&self, id: &str) -> Option<StripePaymentIntent> {
        self.intents.lock().unwrap().get(id).cloned()
    }

    pub fn set_status(&self, id: &str, status: &str) {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(id) {
            intent.status = status.to_string();
        }
    }
}

pub fn intent_from_params(id: &str, params: &PaymentIntentParams) -> StripePaymentIntent {
    StripePaymentIntent {
        id: id.to_string(),
        client_secret: Some(format!("{}_secret_abc", id)),
        amount: params.amount,
        currency: params.currency.clone(),
        status: "requires_payment_method".to_string(),
        metadata: params.metadata.clone(),
        shipping: params.shipping.clone(),
        receipt_email: params.receipt_email.clone(),
        next_action: None,
        last_payment_error: None,
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment_intent(
        &self,
        params: &PaymentIntentParams,
        idempotency_key: Option<String>,
    ) -> Result<StripePaymentIntent, ServiceError> {
        self.idempotency_keys.lock().unwrap().push(idempotency_key);
        let mut intents = self.intents.lock().unwrap();
        let id = format!("pi_fake_{}", intents.len() + 1);
        let intent = intent_from_params(&id, params);
        intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn update_payment_intent(
        &self,
        payment_intent_id: &str,
        params: &PaymentIntentParams,
    ) -> Result<StripePaymentIntent, ServiceError> {
        let mut intents = self.intents.lock().unwrap();
        let existing = intents
            .get(payment_intent_id)
            .ok_or_else(|| ServiceError::NotFound(format!("No such payment_intent: {}", payment_intent_id)))?;
        let mut updated = intent_from_params(payment_intent_id, params);
        updated.status = existing.status.clone();
        intents.insert(payment_intent_id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<StripePaymentIntent, ServiceError> {
        self.intent(payment_intent_id)
            .ok_or_else(|| ServiceError::NotFound(format!("No such payment_intent: {}", payment_intent_id)))
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<StripeCheckoutSession, ServiceError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("No such checkout session: {}", session_id)))
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::new("127.0.0.1".to_string(), 18_080, "test".to_string());
    config.site_url = "https://shop.example.com".to_string();
    config.stripe_publishable_key = Some("pk_test_123".to_string());
    config
}

/// Router wired to `gateway`; `None` behaves like a server without a Stripe key.
pub fn test_router(gateway: Option<Arc<FakeGateway>>) -> Router {
    let gateway = gateway.map(|g| g as Arc<dyn PaymentGateway>);
    let state = AppState::new(test_config(), gateway).expect("valid test state");
    build_router(state)
}

/// Sends a request and returns the status with the decoded JSON body (`Null` when empty).
pub async fn send(router: &Router, request: Request<Body>) -> (axum::http::StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
