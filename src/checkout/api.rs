use super::confirmation::OrderReference;
use crate::{
    models::{
        CreatePaymentIntentRequest, OrderSummary, PaymentIntentResponse, PriceQuote,
        ProductCode, ShippingQuoteRequest, ShippingQuoteResponse, UpdatePaymentIntentRequest,
    },
    services::stripe::IDEMPOTENCY_HEADER,
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckoutApiError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl CheckoutApiError {
    /// Message safe to show the shopper
    pub fn user_message(&self) -> String {
        match self {
            CheckoutApiError::Status { message, .. } if !message.is_empty() => message.clone(),
            _ => "We couldn't reach the payment service. Please try again.".to_string(),
        }
    }
}

/// Endpoints the checkout session calls.
#[async_trait]
pub trait CheckoutApi: Send + Sync {
    async fn shipping_quote(
        &self,
        request: &ShippingQuoteRequest,
    ) -> Result<ShippingQuoteResponse, CheckoutApiError>;

    async fn create_payment_intent(
        &self,
        request: &CreatePaymentIntentRequest,
        idempotency_key: &str,
    ) -> Result<PaymentIntentResponse, CheckoutApiError>;

    async fn update_payment_intent(
        &self,
        request: &UpdatePaymentIntentRequest,
    ) -> Result<PaymentIntentResponse, CheckoutApiError>;

    async fn order_details(
        &self,
        reference: &OrderReference,
    ) -> Result<OrderSummary, CheckoutApiError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// reqwest client for the checkout server
#[derive(Debug, Clone)]
pub struct HttpCheckoutApi {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpCheckoutApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CheckoutApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CheckoutApiError::Transport(format!("invalid base URL: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckoutApiError::Transport(e.to_string()))?;
        Ok(Self { base_url, client })
    }

    fn url(&self, path: &str) -> Result<Url, CheckoutApiError> {
        self.base_url
            .join(path)
            .map_err(|e| CheckoutApiError::Transport(format!("invalid path {}: {}", path, e)))
    }

    async fn read<T: DeserializeOwned>(
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, CheckoutApiError> {
        let response = response.map_err(|e| CheckoutApiError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message.or(b.error))
                .unwrap_or_default();
            debug!(status = status.as_u16(), %message, "checkout endpoint returned an error");
            return Err(CheckoutApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CheckoutApiError::Decode(e.to_string()))
    }

    /// Tier price and checkout link for a product and quantity
    #[instrument(skip(self))]
    pub async fn price_lookup(
        &self,
        product: ProductCode,
        quantity: u32,
    ) -> Result<PriceQuote, CheckoutApiError> {
        let response = self
            .client
            .get(self.url("/api/price-lookup")?)
            .query(&[("product", product.as_ref()), ("quantity", quantity.to_string().as_str())])
            .send()
            .await;
        Self::read(response).await
    }
}

#[async_trait]
impl CheckoutApi for HttpCheckoutApi {
    #[instrument(skip(self, request))]
    async fn shipping_quote(
        &self,
        request: &ShippingQuoteRequest,
    ) -> Result<ShippingQuoteResponse, CheckoutApiError> {
        let response = self
            .client
            .post(self.url("/api/shipping-cost")?)
            .json(request)
            .send()
            .await;
        Self::read(response).await
    }

    #[instrument(skip(self, request))]
    async fn create_payment_intent(
        &self,
        request: &CreatePaymentIntentRequest,
        idempotency_key: &str,
    ) -> Result<PaymentIntentResponse, CheckoutApiError> {
        let response = self
            .client
            .post(self.url("/api/create-payment-intent")?)
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(request)
            .send()
            .await;
        Self::read(response).await
    }

    #[instrument(skip(self, request), fields(payment_intent_id = %request.payment_intent_id))]
    async fn update_payment_intent(
        &self,
        request: &UpdatePaymentIntentRequest,
    ) -> Result<PaymentIntentResponse, CheckoutApiError> {
        let response = self
            .client
            .post(self.url("/api/update-payment-intent")?)
            .json(request)
            .send()
            .await;
        Self::read(response).await
    }

    #[instrument(skip(self))]
    async fn order_details(
        &self,
        reference: &OrderReference,
    ) -> Result<OrderSummary, CheckoutApiError> {
        let (key, value) = reference.query_pair();
        let response = self
            .client
            .get(self.url("/api/order-details")?)
            .query(&[(key, value)])
            .send()
            .await;
        Self::read(response).await
    }
}
