use crate::{errors::ServiceError, metrics};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use tracing::{info, instrument, warn};
use url::Url;

/// Header Stripe uses to deduplicate retried creates
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeAddress {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeShipping {
    pub name: Option<String>,
    #[serde(default)]
    pub address: StripeAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeApiError {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeApiError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    /// Minor units (cents)
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub shipping: Option<StripeShipping>,
    pub receipt_email: Option<String>,
    pub next_action: Option<serde_json::Value>,
    pub last_payment_error: Option<StripeApiError>,
}

impl StripePaymentIntent {
    /// Succeeded, canceled and processing intents can no longer change amount
    pub fn is_locked(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "canceled" | "processing")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeLineItem {
    pub description: Option<String>,
    pub quantity: Option<u32>,
    pub amount_total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
    pub address: Option<StripeAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub payment_status: String,
    pub shipping_details: Option<StripeShipping>,
    pub customer_details: Option<StripeCustomerDetails>,
    pub line_items: Option<StripeList<StripeLineItem>>,
}

/// Create/update parameters for a payment intent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentIntentParams {
    pub amount: i64,
    pub currency: String,
    pub receipt_email: Option<String>,
    pub shipping: Option<StripeShipping>,
    pub metadata: BTreeMap<String, String>,
}

impl PaymentIntentParams {
    /// Stripe's bracketed form encoding
    pub fn to_form(&self, include_payment_methods: bool) -> Vec<(String, String)> {
        let mut form = vec![
            ("amount".to_string(), self.amount.to_string()),
            ("currency".to_string(), self.currency.clone()),
        ];
        if include_payment_methods {
            form.push((
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ));
        }
        if let Some(email) = &self.receipt_email {
            form.push(("receipt_email".to_string(), email.clone()));
        }
        if let Some(shipping) = &self.shipping {
            if let Some(name) = &shipping.name {
                form.push(("shipping[name]".to_string(), name.clone()));
            }
            let address = &shipping.address;
            let fields = [
                ("line1", &address.line1),
                ("line2", &address.line2),
                ("city", &address.city),
                ("state", &address.state),
                ("postal_code", &address.postal_code),
                ("country", &address.country),
            ];
            for (key, value) in fields {
                if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
                    form.push((format!("shipping[address][{}]", key), value.clone()));
                }
            }
        }
        for (key, value) in &self.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }
        form
    }
}

/// Dollars to cents, rejecting negatives and values outside i64
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    if amount.is_sign_negative() {
        return Err(ServiceError::InvalidInput(format!(
            "Amount cannot be negative: {}",
            amount
        )));
    }
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::InvalidInput(format!("Amount out of range: {}", amount)))
}

pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Payment platform operations the checkout server depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        params: &PaymentIntentParams,
        idempotency_key: Option<String>,
    ) -> Result<StripePaymentIntent, ServiceError>;

    async fn update_payment_intent(
        &self,
        payment_intent_id: &str,
        params: &PaymentIntentParams,
    ) -> Result<StripePaymentIntent, ServiceError>;

    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<StripePaymentIntent, ServiceError>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<StripeCheckoutSession, ServiceError>;
}

/// Stripe REST client (form-encoded requests, secret key as basic auth user)
#[derive(Clone)]
pub struct StripeClient {
    secret_key: String,
    api_base: Url,
    client: reqwest::Client,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    pub fn new(
        secret_key: impl Into<String>,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let api_base = Url::parse(api_base)
            .map_err(|e| ServiceError::InternalError(format!("Invalid Stripe API base: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            secret_key: secret_key.into(),
            api_base,
            client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::InternalError("Stripe API base cannot be a base".into()))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ServiceError> {
        let response = request
            .basic_auth(&self.secret_key, Some(""))
            .send()
            .await
            .map_err(|e| {
                metrics::record_stripe_failure(operation);
                ServiceError::ExternalServiceError(format!("Stripe API error: {}", e))
            })?;

        if !response.status().is_success() {
            metrics::record_stripe_failure(operation);
            return Err(error_from_response(operation, response).await);
        }

        response.json::<T>().await.map_err(|e| {
            metrics::record_stripe_failure(operation);
            ServiceError::ExternalServiceError(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

async fn error_from_response(operation: &str, response: Response) -> ServiceError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let api_error = serde_json::from_str::<StripeErrorEnvelope>(&body)
        .ok()
        .map(|envelope| envelope.error);
    let message = api_error
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let is_card_error = api_error
        .as_ref()
        .and_then(|e| e.error_type.as_deref())
        .map_or(false, |t| t == "card_error");

    warn!(operation, status = status.as_u16(), "Stripe API error: {}", message);

    match status {
        StatusCode::NOT_FOUND => ServiceError::NotFound(message),
        StatusCode::PAYMENT_REQUIRED => ServiceError::PaymentFailed(message),
        _ if is_card_error => ServiceError::PaymentFailed(message),
        StatusCode::BAD_REQUEST => ServiceError::InvalidInput(message),
        _ => ServiceError::ExternalServiceError(format!("Stripe error: {}", message)),
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[instrument(skip(self, params))]
    async fn create_payment_intent(
        &self,
        params: &PaymentIntentParams,
        idempotency_key: Option<String>,
    ) -> Result<StripePaymentIntent, ServiceError> {
        let mut request = self
            .client
            .post(self.endpoint(&["payment_intents"])?)
            .form(&params.to_form(true));
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_HEADER, key);
        }

        let intent: StripePaymentIntent = self.send("create_payment_intent", request).await?;
        info!("PaymentIntent created: {}", intent.id);
        Ok(intent)
    }

    #[instrument(skip(self, params))]
    async fn update_payment_intent(
        &self,
        payment_intent_id: &str,
        params: &PaymentIntentParams,
    ) -> Result<StripePaymentIntent, ServiceError> {
        let request = self
            .client
            .post(self.endpoint(&["payment_intents", payment_intent_id])?)
            .form(&params.to_form(false));

        let intent: StripePaymentIntent = self.send("update_payment_intent", request).await?;
        info!("PaymentIntent updated: {}", intent.id);
        Ok(intent)
    }

    #[instrument(skip(self))]
    async fn retrieve_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<StripePaymentIntent, ServiceError> {
        let request = self
            .client
            .get(self.endpoint(&["payment_intents", payment_intent_id])?);
        self.send("retrieve_payment_intent", request).await
    }

    #[instrument(skip(self))]
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<StripeCheckoutSession, ServiceError> {
        let request = self
            .client
            .get(self.endpoint(&["checkout", "sessions", session_id])?)
            .query(&[("expand[]", "line_items")]);
        self.send("retrieve_checkout_session", request).await
    }
}
