use axum::{extract::Request, middleware::Next, response::Response};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Instant;
use tracing::trace;

lazy_static! {
    // HTTP metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounter = register_int_counter!(
        "http_requests_total",
        "Total number of HTTP requests"
    ).unwrap();

    pub static ref HTTP_REQUESTS_ERROR: IntCounter = register_int_counter!(
        "http_requests_error_total",
        "Total number of failed HTTP requests"
    ).unwrap();

    pub static ref HTTP_REQUEST_DURATION: Histogram = register_histogram!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds"
    ).unwrap();

    // Checkout metrics
    pub static ref PRICE_LOOKUPS: IntCounter = register_int_counter!(
        "price_lookups_total",
        "Total number of tier price lookups"
    ).unwrap();

    pub static ref SHIPPING_QUOTES: IntCounter = register_int_counter!(
        "shipping_quotes_total",
        "Total number of shipping quotes computed"
    ).unwrap();

    pub static ref PAYMENT_INTENTS_CREATED: IntCounter = register_int_counter!(
        "payment_intents_created_total",
        "Total number of payment intents created"
    ).unwrap();

    pub static ref PAYMENT_INTENTS_UPDATED: IntCounter = register_int_counter!(
        "payment_intents_updated_total",
        "Total number of payment intent updates"
    ).unwrap();

    pub static ref ORDER_LOOKUPS: IntCounter = register_int_counter!(
        "order_lookups_total",
        "Total number of order confirmation lookups"
    ).unwrap();

    pub static ref STRIPE_FAILURES: IntCounterVec = register_int_counter_vec!(
        "stripe_failures_total",
        "Stripe API failures by operation",
        &["operation"]
    ).unwrap();
}

/// Record HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, started: Instant) {
    HTTP_REQUESTS_TOTAL.inc();

    trace!(
        http.method = method,
        http.path = path,
        http.status = status,
        latency_secs = started.elapsed().as_secs_f64(),
        "recording HTTP request metrics"
    );

    if status >= 400 {
        HTTP_REQUESTS_ERROR.inc();
    }

    HTTP_REQUEST_DURATION.observe(started.elapsed().as_secs_f64());
}

pub fn record_stripe_failure(operation: &str) {
    STRIPE_FAILURES.with_label_values(&[operation]).inc();
}

/// Middleware feeding the HTTP request metrics
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    record_http_request(&method, &path, response.status().as_u16(), started);
    response
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
