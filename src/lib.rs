//! DrainLine checkout
//!
//! The checkout reconciliation flow for DrainLine hardware (cart link parsing,
//! shipping quotes, debounced payment-intent create/update, payment
//! confirmation, order read-back) and the HTTP endpoints it talks to.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod checkout;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod middleware_helpers;
pub mod models;
pub mod services;
pub mod tracing;

use axum::{http::HeaderValue, middleware, Router};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    config::AppConfig,
    errors::ServiceError,
    handlers::AppServices,
    services::stripe::{PaymentGateway, StripeClient},
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Result<Self, ServiceError> {
        let services = AppServices::new(&config, gateway)?;
        Ok(Self {
            config: Arc::new(config),
            services,
        })
    }

    /// Builds the Stripe client when a secret key is configured; payments stay disabled otherwise.
    pub fn from_config(config: AppConfig) -> Result<Self, ServiceError> {
        let gateway = match config.stripe_secret_key() {
            Some(secret) => {
                let client =
                    StripeClient::new(secret, &config.stripe_api_base, config.request_timeout())?;
                Some(Arc::new(client) as Arc<dyn PaymentGateway>)
            }
            None => {
                ::tracing::warn!("Stripe secret key not configured; payment endpoints will return 503");
                None
            }
        };
        Self::new(config, gateway)
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if !config.is_production() {
        ::tracing::info!("Using permissive CORS because explicit origins were not configured");
        CorsLayer::permissive()
    } else {
        ::tracing::warn!("No CORS origins configured; cross-origin requests will be refused");
        CorsLayer::new()
    }
}

/// Full application router with the middleware stack applied.
pub fn build_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    Router::new()
        .merge(handlers::health_routes())
        .nest("/api", handlers::api_routes())
        .layer(middleware::from_fn(
            middleware_helpers::sanitize::sanitize_middleware,
        ))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config))
        .layer(middleware::from_fn(
            middleware_helpers::security_headers::security_headers_middleware,
        ))
        .layer(middleware::from_fn(metrics::track_metrics))
        // Ensure every request carries a request id for traceability
        .layer(middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
