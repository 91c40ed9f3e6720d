use crate::{errors::ServiceError, metrics, AppState};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::time::Instant;

/// Tracks application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn get_uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

/// Liveness probe; also reports whether payments are configured
pub async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_secs": get_uptime_secs(),
        "payments": if state.services.payments_enabled { "configured" } else { "disabled" },
    }))
}

/// Prometheus text exposition
pub async fn metrics_handler() -> Result<Response, ServiceError> {
    let body = metrics::gather_metrics()
        .map_err(|e| ServiceError::InternalError(format!("Failed to encode metrics: {}", e)))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
