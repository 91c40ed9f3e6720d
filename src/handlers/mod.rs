pub mod client_config;
pub mod health;
pub mod orders;
pub mod payment_intents;
pub mod pricing;
pub mod shipping;

use crate::{
    config::AppConfig,
    errors::ServiceError,
    services::{
        orders::OrderLookupService, payment_intents::PaymentIntentService,
        pricing::PricingService, shipping::ShippingRateService, stripe::PaymentGateway,
        tax::TaxService,
    },
    AppState,
};
use axum::{
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub pricing: Arc<PricingService>,
    pub shipping: Arc<ShippingRateService>,
    pub payment_intents: Arc<PaymentIntentService>,
    pub orders: Arc<OrderLookupService>,
    /// False when no Stripe secret key is configured
    pub payments_enabled: bool,
}

impl AppServices {
    pub fn new(
        config: &AppConfig,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Result<Self, ServiceError> {
        let pricing = Arc::new(PricingService::new(&config.site_url)?);
        let shipping = Arc::new(ShippingRateService::new());
        let default_rate = Decimal::try_from(config.default_tax_rate).map_err(|e| {
            ServiceError::InternalError(format!("Invalid default tax rate: {}", e))
        })?;
        let tax = Arc::new(TaxService::new(default_rate));

        Ok(Self {
            payment_intents: Arc::new(PaymentIntentService::new(
                gateway.clone(),
                Arc::clone(&pricing),
                Arc::clone(&shipping),
                tax,
                config.currency.clone(),
            )),
            orders: Arc::new(OrderLookupService::new(gateway.clone())),
            payments_enabled: gateway.is_some(),
            pricing,
            shipping,
        })
    }
}

/// Checkout endpoints, without middleware
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/client-config", get(client_config::client_config))
        .route("/price-lookup", get(pricing::price_lookup))
        .route("/shipping-cost", post(shipping::shipping_cost))
        .route(
            "/create-payment-intent",
            post(payment_intents::create_payment_intent),
        )
        .route(
            "/update-payment-intent",
            post(payment_intents::update_payment_intent),
        )
        .route("/order-details", get(orders::order_details))
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::liveness_check))
        .route("/metrics", get(health::metrics_handler))
}
