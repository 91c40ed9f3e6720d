use crate::{
    errors::ServiceError,
    metrics::{PAYMENT_INTENTS_CREATED, PAYMENT_INTENTS_UPDATED},
    middleware_helpers::sanitize::{sanitize_address, sanitize_email, sanitize_string},
    models::{
        CreatePaymentIntentRequest, PaymentIntentResponse, ProductCode, QuoteDestination,
        ShippingAddress, ShippingQuoteRequest, TaxDetail, UpdatePaymentIntentRequest,
    },
    services::{
        pricing::PricingService,
        shipping::ShippingRateService,
        stripe::{
            from_minor_units, to_minor_units, PaymentGateway, PaymentIntentParams, StripeAddress,
            StripePaymentIntent, StripeShipping,
        },
        tax::TaxService,
    },
};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, instrument};
use validator::Validate;

static PAYMENT_INTENT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^pi_[A-Za-z0-9_]+$").expect("static regex"));

/// Server-side totals for one checkout
#[derive(Debug, Clone, PartialEq)]
struct PricedOrder {
    address: ShippingAddress,
    subtotal: Decimal,
    shipping_cost: Decimal,
    tax_amount: Decimal,
    tax_details: Vec<TaxDetail>,
    total: Decimal,
}

/// Creates and updates payment intents with amounts computed on the server.
#[derive(Clone)]
pub struct PaymentIntentService {
    gateway: Option<Arc<dyn PaymentGateway>>,
    pricing: Arc<PricingService>,
    shipping: Arc<ShippingRateService>,
    tax: Arc<TaxService>,
    currency: String,
}

impl PaymentIntentService {
    pub fn new(
        gateway: Option<Arc<dyn PaymentGateway>>,
        pricing: Arc<PricingService>,
        shipping: Arc<ShippingRateService>,
        tax: Arc<TaxService>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            pricing,
            shipping,
            tax,
            currency: currency.into(),
        }
    }

    fn gateway(&self) -> Result<&Arc<dyn PaymentGateway>, ServiceError> {
        self.gateway.as_ref().ok_or_else(|| {
            ServiceError::ServiceUnavailable("Payment processing is not configured".to_string())
        })
    }

    fn price_order(
        &self,
        product: ProductCode,
        quantity: u32,
        price_id: &str,
        address: &ShippingAddress,
    ) -> Result<PricedOrder, ServiceError> {
        if let Some(message) = address.email_error() {
            return Err(ServiceError::InvalidInput(message));
        }
        let address = sanitize_address(address);
        if !address.is_complete() {
            return Err(ServiceError::InvalidInput(
                "Shipping address is incomplete".to_string(),
            ));
        }
        address.validate()?;

        let tier = self.pricing.verify(product, quantity, price_id)?;
        let subtotal = tier.unit_price * Decimal::from(quantity);

        let shipping_cost = self.shipping.quote(&ShippingQuoteRequest {
            address: QuoteDestination {
                city: address.city.clone(),
                state: address.state.clone(),
                postal_code: address.zip.clone(),
                country: address.country,
            },
            products: BTreeMap::from([(product, quantity)]),
        })?;

        let tax = self
            .tax
            .calculate_tax(subtotal, shipping_cost, &address.state, address.country)?;
        let total = subtotal + shipping_cost + tax.tax_amount;

        Ok(PricedOrder {
            address,
            subtotal,
            shipping_cost,
            tax_amount: tax.tax_amount,
            tax_details: tax.details,
            total,
        })
    }

    fn intent_params(
        &self,
        order: &PricedOrder,
        product: ProductCode,
        quantity: u32,
        price_id: &str,
        extra_metadata: &[(&str, Option<String>)],
    ) -> Result<PaymentIntentParams, ServiceError> {
        let address = &order.address;
        let mut metadata = BTreeMap::from([
            ("product".to_string(), product.to_string()),
            ("quantity".to_string(), quantity.to_string()),
            ("price_id".to_string(), price_id.to_string()),
            ("subtotal".to_string(), order.subtotal.to_string()),
            ("shipping_cost".to_string(), order.shipping_cost.to_string()),
            ("tax_amount".to_string(), order.tax_amount.to_string()),
        ]);
        for (key, value) in extra_metadata {
            if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
                metadata.insert(key.to_string(), value.clone());
            }
        }

        Ok(PaymentIntentParams {
            amount: to_minor_units(order.total)?,
            currency: self.currency.clone(),
            receipt_email: Some(address.email.clone()),
            shipping: Some(StripeShipping {
                name: Some(address.name.clone()),
                address: StripeAddress {
                    line1: Some(address.line1.clone()),
                    line2: Some(address.line2.clone()),
                    city: Some(address.city.clone()),
                    state: Some(address.state.clone()),
                    postal_code: Some(address.zip.clone()),
                    country: Some(address.country.to_string()),
                },
            }),
            metadata,
        })
    }

    fn response(
        intent: StripePaymentIntent,
        order: PricedOrder,
    ) -> Result<PaymentIntentResponse, ServiceError> {
        let client_secret = intent.client_secret.ok_or_else(|| {
            ServiceError::ExternalServiceError(format!(
                "Payment intent {} returned no client secret",
                intent.id
            ))
        })?;

        Ok(PaymentIntentResponse {
            client_secret,
            payment_intent_id: intent.id,
            tax_amount: order.tax_amount,
            tax_details: order.tax_details,
            shipping_cost: order.shipping_cost,
            amount: Some(from_minor_units(intent.amount)),
        })
    }

    #[instrument(skip(self, request), fields(product = %request.product, quantity = request.quantity))]
    pub async fn create(
        &self,
        request: CreatePaymentIntentRequest,
        idempotency_key: Option<String>,
    ) -> Result<PaymentIntentResponse, ServiceError> {
        let gateway = self.gateway()?;
        let order = self.price_order(
            request.product,
            request.quantity,
            &request.price_id,
            &request.shipping_address.address,
        )?;

        let user_email = request.user_email.as_deref().map(sanitize_email);
        let user_id = request.user_id.as_deref().map(sanitize_string);
        let params = self.intent_params(
            &order,
            request.product,
            request.quantity,
            &request.price_id,
            &[("user_email", user_email), ("user_id", user_id)],
        )?;

        let intent = gateway.create_payment_intent(&params, idempotency_key).await?;
        PAYMENT_INTENTS_CREATED.inc();
        info!(payment_intent_id = %intent.id, total = %order.total, "payment intent created");

        Self::response(intent, order)
    }

    #[instrument(skip(self, request), fields(payment_intent_id = %request.payment_intent_id))]
    pub async fn update(
        &self,
        request: UpdatePaymentIntentRequest,
    ) -> Result<PaymentIntentResponse, ServiceError> {
        let gateway = self.gateway()?;
        if !PAYMENT_INTENT_ID.is_match(&request.payment_intent_id) {
            return Err(ServiceError::InvalidInput(
                "Invalid payment intent id".to_string(),
            ));
        }

        let order = self.price_order(
            request.product,
            request.quantity,
            &request.price_id,
            &request.shipping_address.address,
        )?;

        let existing = gateway
            .retrieve_payment_intent(&request.payment_intent_id)
            .await?;
        if existing.is_locked() {
            return Err(ServiceError::InvalidOperation(format!(
                "Payment intent {} is already {}",
                existing.id, existing.status
            )));
        }

        let params = self.intent_params(
            &order,
            request.product,
            request.quantity,
            &request.price_id,
            &[],
        )?;
        let intent = gateway
            .update_payment_intent(&request.payment_intent_id, &params)
            .await?;
        PAYMENT_INTENTS_UPDATED.inc();
        info!(payment_intent_id = %intent.id, total = %order.total, "payment intent updated");

        Self::response(intent, order)
    }
}
